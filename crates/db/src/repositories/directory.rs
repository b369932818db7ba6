use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use leaveflow_core::approvals::{HrAssignment, RoleGraph, RoleInheritance};
use leaveflow_core::domain::employee::{CollarType, EmployeeRecord, RoleCode, UserId};
use leaveflow_core::errors::WorkflowError;
use leaveflow_core::ports::{EmployeeDirectory, RoleConfigSource};

use super::{decode_err, RepositoryError};
use crate::DbPool;

/// Employee records, role inheritance and HR assignments backed by SQLite.
pub struct SqlDirectory {
    pool: DbPool,
}

impl SqlDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_employee(&self, record: &EmployeeRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (employee_id, supervisor_id, general_manager_id, collar_type,
                                   employee_type, assigned_role)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(employee_id) DO UPDATE SET
                supervisor_id = excluded.supervisor_id,
                general_manager_id = excluded.general_manager_id,
                collar_type = excluded.collar_type,
                employee_type = excluded.employee_type,
                assigned_role = excluded.assigned_role",
        )
        .bind(&record.employee_id.0)
        .bind(record.supervisor_id.as_ref().map(|id| id.0.as_str()))
        .bind(record.general_manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(record.collar_type.as_str())
        .bind(&record.employee_type)
        .bind(record.assigned_role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_hr_assignment(&self, assignment: &HrAssignment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT OR IGNORE INTO hr_assignment (hr_user_id, employee_type) VALUES (?, ?)",
        )
        .bind(&assignment.hr_user_id.0)
        .bind(&assignment.employee_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or reactivates an inheritance edge. Edges that would close a
    /// cycle over the currently active graph are rejected.
    pub async fn add_role_edge(&self, edge: &RoleInheritance) -> Result<(), RepositoryError> {
        if edge.active {
            let graph = RoleGraph::new(self.load_edges().await?);
            graph
                .check_new_edge(&edge.child_role, &edge.parent_role)
                .map_err(|error| RepositoryError::Rejected(error.to_string()))?;
        }

        sqlx::query(
            "INSERT INTO role_inheritance (child_role, parent_role, active, priority)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(child_role, parent_role) DO UPDATE SET
                active = excluded.active,
                priority = excluded.priority",
        )
        .bind(edge.child_role.as_str())
        .bind(edge.parent_role.as_str())
        .bind(edge.active)
        .bind(edge.priority)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_edges(&self) -> Result<Vec<RoleInheritance>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT child_role, parent_role, active, priority
             FROM role_inheritance
             ORDER BY priority DESC, child_role ASC, parent_role ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let child: String = row.try_get("child_role").map_err(decode_err)?;
                let parent: String = row.try_get("parent_role").map_err(decode_err)?;
                Ok(RoleInheritance {
                    child_role: RoleCode::new(child),
                    parent_role: RoleCode::new(parent),
                    active: row.try_get("active").map_err(decode_err)?,
                    priority: row.try_get("priority").map_err(decode_err)?,
                })
            })
            .collect()
    }

    async fn load_assignments(&self) -> Result<Vec<HrAssignment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT hr_user_id, employee_type FROM hr_assignment
             ORDER BY hr_user_id ASC, employee_type ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let hr_user_id: String = row.try_get("hr_user_id").map_err(decode_err)?;
                let employee_type: String = row.try_get("employee_type").map_err(decode_err)?;
                Ok(HrAssignment::new(hr_user_id, employee_type))
            })
            .collect()
    }
}

fn row_to_employee(row: &SqliteRow) -> Result<EmployeeRecord, RepositoryError> {
    let employee_id: String = row.try_get("employee_id").map_err(decode_err)?;
    let supervisor_id: Option<String> = row.try_get("supervisor_id").map_err(decode_err)?;
    let general_manager_id: Option<String> =
        row.try_get("general_manager_id").map_err(decode_err)?;
    let collar_type: String = row.try_get("collar_type").map_err(decode_err)?;
    let assigned_role: String = row.try_get("assigned_role").map_err(decode_err)?;

    Ok(EmployeeRecord {
        employee_id: UserId(employee_id),
        supervisor_id: supervisor_id.map(UserId),
        general_manager_id: general_manager_id.map(UserId),
        collar_type: CollarType::parse(&collar_type).ok_or_else(|| {
            RepositoryError::Decode(format!("collar_type: unknown `{collar_type}`"))
        })?,
        employee_type: row.try_get("employee_type").map_err(decode_err)?,
        assigned_role: RoleCode::new(assigned_role),
    })
}

#[async_trait]
impl EmployeeDirectory for SqlDirectory {
    async fn find_employee(&self, id: &UserId) -> Result<Option<EmployeeRecord>, WorkflowError> {
        let row = sqlx::query(
            "SELECT employee_id, supervisor_id, general_manager_id, collar_type, employee_type,
                    assigned_role
             FROM employee WHERE employee_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(row_to_employee).transpose()?)
    }

    async fn list_by_role(&self, role: &RoleCode) -> Result<Vec<EmployeeRecord>, WorkflowError> {
        let rows = sqlx::query(
            "SELECT employee_id, supervisor_id, general_manager_id, collar_type, employee_type,
                    assigned_role
             FROM employee WHERE assigned_role = ? ORDER BY employee_id ASC",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let records: Result<Vec<_>, RepositoryError> = rows.iter().map(row_to_employee).collect();
        Ok(records?)
    }
}

#[async_trait]
impl RoleConfigSource for SqlDirectory {
    async fn role_edges(&self) -> Result<Vec<RoleInheritance>, WorkflowError> {
        Ok(self.load_edges().await?)
    }

    async fn hr_assignments(&self) -> Result<Vec<HrAssignment>, WorkflowError> {
        Ok(self.load_assignments().await?)
    }
}
