//! Round-robin cursor with a daily reset in the tenant's timezone.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rd_domain::clock::Clock;
use rd_domain::config::Employee;
use rd_domain::error::Result;
use rd_store::DocumentStore;

use crate::tenants::Tenant;

pub const COLLECTION: &str = "assignment_state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentState {
    pub current_index: usize,
    pub last_updated_date: NaiveDate,
}

pub struct RoundRobin {
    docs: Arc<DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl RoundRobin {
    pub fn new(docs: Arc<DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { docs, clock }
    }

    /// Pick `pool[cursor]` and advance the cursor, in one transaction.
    /// The first call on a new tenant-local day starts again at 0.
    pub fn next<'a>(
        &self,
        tenant: &Tenant,
        pool_name: &str,
        pool: &[&'a Employee],
    ) -> Result<Option<&'a Employee>> {
        if pool.is_empty() {
            return Ok(None);
        }
        let key = format!("{}:{pool_name}", tenant.id);
        let today = self.clock.now().with_timezone(&tenant.tz).date_naive();
        let k = pool.len();

        let index = self.docs.transaction(|tx| {
            let state: Option<AssignmentState> = match tx.get(COLLECTION, &key) {
                Some(v) => Some(serde_json::from_value(v)?),
                None => None,
            };
            let index = match state {
                Some(s) if s.last_updated_date == today => s.current_index % k,
                _ => 0,
            };
            let next = AssignmentState {
                current_index: (index + 1) % k,
                last_updated_date: today,
            };
            tx.set(COLLECTION, &key, serde_json::to_value(&next)?, false);
            Ok(index)
        })?;

        tracing::debug!(tenant = %tenant.id, pool = pool_name, index, "round-robin pick");
        Ok(Some(pool[index]))
    }

    pub fn state(&self, tenant_id: &str, pool_name: &str) -> Result<Option<AssignmentState>> {
        self.docs
            .get_as(COLLECTION, &format!("{tenant_id}:{pool_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rd_domain::clock::ManualClock;
    use rd_domain::config::TenantConfig;
    use std::collections::HashMap;

    fn staff(n: usize) -> Vec<Employee> {
        (0..n)
            .map(|i| Employee {
                name: format!("m{i}"),
                phone: format!("p{i}"),
                weight: 1,
                role: "manager".into(),
                group: None,
            })
            .collect()
    }

    fn tenant(tz: &str) -> Tenant {
        Tenant::new(
            "acme",
            TenantConfig {
                timezone: tz.into(),
                ..TenantConfig::default()
            },
            30,
        )
    }

    #[test]
    fn cycles_fairly_within_a_day() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()));
        let rr = RoundRobin::new(Arc::new(DocumentStore::in_memory()), clock);
        let roster = staff(3);
        let pool: Vec<&Employee> = roster.iter().collect();
        let t = tenant("UTC");

        let picks: Vec<String> = (0..7)
            .map(|_| rr.next(&t, "manager", &pool).unwrap().unwrap().name.clone())
            .collect();
        assert_eq!(picks, vec!["m0", "m1", "m2", "m0", "m1", "m2", "m0"]);
    }

    #[test]
    fn resets_on_new_local_day() {
        // 02:30 UTC is still the previous evening in São Paulo.
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 20, 0, 0).unwrap()));
        let rr = RoundRobin::new(Arc::new(DocumentStore::in_memory()), clock.clone());
        let roster = staff(3);
        let pool: Vec<&Employee> = roster.iter().collect();
        let t = tenant("America/Sao_Paulo");

        rr.next(&t, "manager", &pool).unwrap();
        clock.set(Utc.with_ymd_and_hms(2026, 5, 5, 2, 30, 0).unwrap());
        assert_eq!(rr.next(&t, "manager", &pool).unwrap().unwrap().name, "m1");

        clock.advance(Duration::hours(1));
        // 03:30 UTC is 00:30 local: a new day.
        assert_eq!(rr.next(&t, "manager", &pool).unwrap().unwrap().name, "m0");
        let state = rr.state("acme", "manager").unwrap().unwrap();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.last_updated_date, NaiveDate::from_ymd_opt(2026, 5, 5).unwrap());
    }

    #[test]
    fn concurrent_picks_never_share_an_index() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()));
        let docs = Arc::new(DocumentStore::in_memory().with_max_retries(1_000));
        let rr = RoundRobin::new(docs, clock);
        let roster = staff(4);
        let pool: Vec<&Employee> = roster.iter().collect();
        let t = tenant("UTC");

        let mut counts: HashMap<String, usize> = HashMap::new();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..10)
                            .map(|_| rr.next(&t, "manager", &pool).unwrap().unwrap().name.clone())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for h in handles {
                for name in h.join().unwrap() {
                    *counts.entry(name).or_default() += 1;
                }
            }
        });
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 20), "{counts:?}");
    }

    #[test]
    fn empty_pool_yields_none() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let rr = RoundRobin::new(Arc::new(DocumentStore::in_memory()), clock);
        assert!(rr.next(&tenant("UTC"), "manager", &[]).unwrap().is_none());
    }
}
