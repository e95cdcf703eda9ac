//! Staff assignment.
//!
//! A contact is handed to staff in two independent draws: a round-robin
//! pick over the tenant's manager tier, then a weighted draw over the
//! sales tier.  The manager is notified first.  The final assignee is
//! recorded on the contact as an `assigned_to:<name>` tag.

pub mod roster;
pub mod round_robin;
pub mod weighted;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use rd_domain::config::Employee;
use rd_domain::error::{Error, Result};

use crate::runtime::contacts::ContactStore;
use crate::tenants::{render, Tenant};
use crate::transport::Transport;

pub use roster::{pool, RosterCache};
pub use round_robin::{AssignmentState, RoundRobin};
pub use weighted::weighted_pick;

/// Who got the contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub contact_id: String,
    /// Round-robin manager pick, when the tenant has a manager tier.
    pub manager: Option<Employee>,
    pub assignee: Employee,
}

pub struct AssignmentEngine {
    roster: Arc<RosterCache>,
    round_robin: RoundRobin,
    contacts: Arc<ContactStore>,
    transport: Arc<dyn Transport>,
    rng: Mutex<StdRng>,
}

impl AssignmentEngine {
    pub fn new(
        roster: Arc<RosterCache>,
        round_robin: RoundRobin,
        contacts: Arc<ContactStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            roster,
            round_robin,
            contacts,
            transport,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn roster(&self) -> &Arc<RosterCache> {
        &self.roster
    }

    pub async fn assign_contact(&self, tenant: &Tenant, contact_id: &str) -> Result<Assignment> {
        let roster = self.roster.snapshot(tenant);
        let handoff = &tenant.config.handoff;

        let manager = if handoff.manager_role.is_empty() {
            None
        } else {
            let managers = pool(&roster, &handoff.manager_role);
            self.round_robin
                .next(tenant, &handoff.manager_role, &managers)?
                .cloned()
        };
        if let Some(m) = &manager {
            self.notify(tenant, m, contact_id).await;
        }

        let sales = pool(&roster, &handoff.sales_role);
        let drawn = {
            let mut rng = self.rng.lock();
            weighted_pick(&sales, &mut *rng).cloned()
        };
        let assignee = match (drawn, &manager) {
            (Some(e), _) => e,
            (None, Some(m)) => m.clone(),
            (None, None) => {
                return Err(Error::Validation(format!(
                    "tenant {} has no active staff to assign",
                    tenant.id
                )))
            }
        };

        self.contacts.assign(&tenant.id, contact_id, &assignee.name)?;
        if manager.as_ref() != Some(&assignee) {
            self.notify(tenant, &assignee, contact_id).await;
        }

        tracing::info!(
            tenant = %tenant.id,
            contact_id,
            manager = manager.as_ref().map(|m| m.name.as_str()).unwrap_or(""),
            assignee = %assignee.name,
            "contact assigned"
        );
        Ok(Assignment {
            contact_id: contact_id.to_owned(),
            manager,
            assignee,
        })
    }

    /// Notification failures are logged; the assignment stands.
    async fn notify(&self, tenant: &Tenant, staff: &Employee, contact_id: &str) {
        let headline = render(
            &tenant.config.templates.staff_assigned,
            &[
                ("contact", contact_id),
                ("staff", &staff.name),
                ("tenant", tenant.display_name()),
            ],
        );
        let text = tenant.notification(
            &headline,
            &[("Contact", contact_id), ("Role", &staff.role)],
        );
        if let Err(e) = self.transport.send_text(&tenant.id, &staff.phone, &text).await {
            tracing::warn!(
                tenant = %tenant.id,
                staff = %staff.name,
                error = %e,
                "staff notification failed"
            );
        }
    }
}
