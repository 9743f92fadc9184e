use async_trait::async_trait;
use chrono::Utc;

use ainventory_auth::User;
use ainventory_core::{DepartmentId, UserId};
use ainventory_org::{
    Department, HierarchyEdge, NewDepartment, ancestor_ids, closure_edges_for, descendant_ids,
    generate_code, is_ancestor_of,
};

use super::{InMemoryStore, State, upsert};
use crate::store::{DepartmentStore, StoreError, StoreResult};

impl State {
    fn departments_by_id(&self, ids: Vec<DepartmentId>) -> Vec<Department> {
        ids.into_iter()
            .filter_map(|id| self.departments.get(&id).cloned())
            .collect()
    }

    /// `employee_count` is the number of active users in the department.
    pub(super) fn recount_department(&mut self, id: Option<DepartmentId>) {
        let Some(id) = id else { return };
        let count = self
            .users
            .values()
            .filter(|u| u.department_id == Some(id) && u.is_active())
            .count() as i64;
        if let Some(department) = self.departments.get_mut(&id) {
            department.employee_count = count;
        }
    }
}

#[async_trait]
impl DepartmentStore for InMemoryStore {
    async fn create_department(
        &self,
        input: NewDepartment,
        created_by: Option<UserId>,
    ) -> StoreResult<Department> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;

        if let Some(parent_id) = input.parent_id {
            if !state.departments.contains_key(&parent_id) {
                return Err(StoreError::validation("parent department does not exist"));
            }
        }
        if let Some(manager_id) = input.manager_id {
            if !state.users.contains_key(&manager_id) {
                return Err(StoreError::validation("manager does not exist"));
            }
        }
        let code = match &input.code {
            Some(code) if state.departments.values().any(|d| &d.code == code) => {
                return Err(StoreError::conflict("department code already exists"));
            }
            Some(code) => code.clone(),
            None => generate_code(&input.name, |candidate| {
                state.departments.values().any(|d| d.code == candidate)
            }),
        };

        let id = state.next_id("departments");
        let edges = closure_edges_for(id, input.parent_id, &state.hierarchy);
        let department = input.into_department(id, code, created_by, Utc::now());
        upsert(&mut state.departments, &department);
        state.hierarchy.extend(edges);
        Ok(department)
    }

    async fn get_department(&self, id: DepartmentId) -> StoreResult<Department> {
        let state = self.state.read().await;
        state.department(id).cloned()
    }

    async fn list_departments(&self) -> StoreResult<Vec<Department>> {
        let state = self.state.read().await;
        let mut departments: Vec<_> = state.departments.values().cloned().collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn child_departments(&self, id: DepartmentId) -> StoreResult<Vec<Department>> {
        let state = self.state.read().await;
        state.department(id)?;
        let mut children: Vec<_> = state
            .departments
            .values()
            .filter(|d| d.parent_id == Some(id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn ancestors(&self, id: DepartmentId) -> StoreResult<Vec<Department>> {
        let state = self.state.read().await;
        state.department(id)?;
        Ok(state.departments_by_id(ancestor_ids(&state.hierarchy, id)))
    }

    async fn descendants(&self, id: DepartmentId) -> StoreResult<Vec<Department>> {
        let state = self.state.read().await;
        state.department(id)?;
        Ok(state.departments_by_id(descendant_ids(&state.hierarchy, id)))
    }

    async fn is_ancestor_of(
        &self,
        ancestor: DepartmentId,
        descendant: DepartmentId,
    ) -> StoreResult<bool> {
        let state = self.state.read().await;
        state.department(ancestor)?;
        state.department(descendant)?;
        Ok(is_ancestor_of(&state.hierarchy, ancestor, descendant))
    }

    async fn closure_rows_for(&self, id: DepartmentId) -> StoreResult<Vec<HierarchyEdge>> {
        let state = self.state.read().await;
        state.department(id)?;
        let mut rows: Vec<_> = state
            .hierarchy
            .iter()
            .filter(|edge| edge.descendant_id == id)
            .copied()
            .collect();
        rows.sort_by_key(|edge| edge.depth);
        Ok(rows)
    }

    async fn delete_department(&self, id: DepartmentId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let department = state.department(id)?;
        let active_users = state
            .users
            .values()
            .filter(|u| u.department_id == Some(id) && u.is_active())
            .count() as i64;
        let children = state
            .departments
            .values()
            .filter(|d| d.parent_id == Some(id))
            .count() as i64;
        department.ensure_deletable(active_users, children)?;

        state.departments.remove(&id);
        state
            .hierarchy
            .retain(|edge| edge.ancestor_id != id && edge.descendant_id != id);
        state
            .department_permissions
            .retain(|(department_id, _), _| *department_id != id);
        for user in state.users.values_mut().filter(|u| u.department_id == Some(id)) {
            user.department_id = None;
        }
        Ok(())
    }

    async fn assign_user_department(
        &self,
        user_id: UserId,
        department_id: Option<DepartmentId>,
    ) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if let Some(department_id) = department_id {
            state.department(department_id)?;
        }
        let user = state.user_mut(user_id)?;
        let previous = std::mem::replace(&mut user.department_id, department_id);
        let user = user.clone();

        state.recount_department(previous);
        state.recount_department(department_id);
        Ok(user)
    }
}
