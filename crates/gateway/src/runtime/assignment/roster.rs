//! Per-tenant staff roster snapshots.
//!
//! The first lookup for a tenant seeds the cache from its configured staff
//! list.  A snapshot is reused until [`RosterCache::refresh`] replaces it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use rd_domain::config::Employee;

use crate::tenants::Tenant;

#[derive(Default)]
pub struct RosterCache {
    rosters: RwLock<HashMap<String, Arc<Vec<Employee>>>>,
}

impl RosterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, tenant: &Tenant) -> Arc<Vec<Employee>> {
        if let Some(roster) = self.rosters.read().get(&tenant.id) {
            return roster.clone();
        }
        self.rosters
            .write()
            .entry(tenant.id.clone())
            .or_insert_with(|| Arc::new(tenant.config.staff.clone()))
            .clone()
    }

    /// Replace a tenant's roster.  Affects only that tenant.
    pub fn refresh(&self, tenant_id: &str, staff: Vec<Employee>) {
        tracing::info!(tenant = tenant_id, staff = staff.len(), "roster refreshed");
        self.rosters
            .write()
            .insert(tenant_id.to_owned(), Arc::new(staff));
    }
}

/// Active members (positive weight) holding `role`.
pub fn pool<'a>(roster: &'a [Employee], role: &str) -> Vec<&'a Employee> {
    roster
        .iter()
        .filter(|e| e.weight > 0 && e.role.eq_ignore_ascii_case(role))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd_domain::config::TenantConfig;

    fn employee(name: &str, role: &str, weight: u32) -> Employee {
        Employee {
            name: name.into(),
            phone: format!("{name}-phone"),
            weight,
            role: role.into(),
            group: None,
        }
    }

    fn tenant(id: &str, staff: Vec<Employee>) -> Tenant {
        Tenant::new(
            id,
            TenantConfig {
                staff,
                ..TenantConfig::default()
            },
            30,
        )
    }

    #[test]
    fn refresh_is_tenant_scoped() {
        let cache = RosterCache::new();
        let acme = tenant("acme", vec![employee("ana", "sales", 1)]);
        let globex = tenant("globex", vec![employee("gus", "sales", 1)]);

        assert_eq!(cache.snapshot(&acme)[0].name, "ana");
        cache.refresh("acme", vec![employee("bea", "sales", 2)]);
        assert_eq!(cache.snapshot(&acme)[0].name, "bea");
        assert_eq!(cache.snapshot(&globex)[0].name, "gus");
    }

    #[test]
    fn pool_excludes_inactive_and_other_roles() {
        let roster = vec![
            employee("ana", "sales", 1),
            employee("bob", "Sales", 0),
            employee("cy", "manager", 1),
        ];
        let names: Vec<_> = pool(&roster, "sales").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ana"]);
    }
}
