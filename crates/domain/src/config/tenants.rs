use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tenants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-tenant strategy entry.  Everything that used to differ between
/// tenants by code branch lives here and is resolved once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Display name used in staff notifications.
    #[serde(default)]
    pub name: String,
    /// Assistant the tenant's runs are created against.
    #[serde(default)]
    pub assistant_id: String,
    /// IANA timezone; defines the tenant-local calendar day.
    #[serde(default = "d_timezone")]
    pub timezone: String,
    /// Overrides `[debounce] window_secs` for this tenant.
    #[serde(default)]
    pub debounce_window_secs: Option<u64>,
    /// Tool categories exposed to the assistant.
    #[serde(default = "d_tools")]
    pub tools: Vec<ToolCategory>,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub report_format: ReportFormat,
    /// Internal staff group that receives handoff and booking alerts.
    #[serde(default)]
    pub target_group_id: Option<String>,
    /// External calendar identifier recorded on bookings.
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// External spreadsheet identifier recorded on bookings and tasks.
    #[serde(default)]
    pub sheet_id: Option<String>,
    /// Staff roster snapshot.
    #[serde(default)]
    pub staff: Vec<Employee>,
    #[serde(default)]
    pub handoff: HandoffConfig,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            assistant_id: String::new(),
            timezone: d_timezone(),
            debounce_window_secs: None,
            tools: d_tools(),
            templates: TemplatesConfig::default(),
            report_format: ReportFormat::default(),
            target_group_id: None,
            calendar_id: None,
            sheet_id: None,
            staff: Vec::new(),
            handoff: HandoffConfig::default(),
        }
    }
}

impl TenantConfig {
    /// Parsed timezone, falling back to UTC.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    pub fn has_tool(&self, category: ToolCategory) -> bool {
        self.tools.contains(&category)
    }

    /// Staff members with a positive weight.
    pub fn active_staff(&self) -> impl Iterator<Item = &Employee> {
        self.staff.iter().filter(|e| e.weight > 0)
    }
}

/// Groups of tools a tenant can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Followups,
    Tagging,
    Handoff,
    Booking,
    Tasks,
}

fn d_tools() -> Vec<ToolCategory> {
    vec![ToolCategory::Followups, ToolCategory::Tagging]
}

fn d_timezone() -> String {
    "UTC".into()
}

/// How staff-facing notifications are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// One line: template text only.
    #[default]
    Compact,
    /// Template text followed by a field-per-line summary.
    Detailed,
}

/// Message templates.  `{contact}`, `{staff}`, `{tenant}`, `{when}` and
/// `{details}` are substituted where they appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "d_reset")]
    pub reset: String,
    #[serde(default = "d_staff_assigned")]
    pub staff_assigned: String,
    #[serde(default = "d_booking_reminder")]
    pub booking_reminder: String,
    #[serde(default = "d_booking_alert")]
    pub booking_alert: String,
    #[serde(default = "d_task_assigned")]
    pub task_assigned: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            reset: d_reset(),
            staff_assigned: d_staff_assigned(),
            booking_reminder: d_booking_reminder(),
            booking_alert: d_booking_alert(),
            task_assigned: d_task_assigned(),
        }
    }
}

fn d_reset() -> String {
    "Conversation reset. How can I help you?".into()
}

fn d_staff_assigned() -> String {
    "New contact {contact} has been assigned to you, {staff}.".into()
}

fn d_booking_reminder() -> String {
    "Reminder: your appointment is scheduled for {when}.".into()
}

fn d_booking_alert() -> String {
    "New booking from {contact} for {when}.".into()
}

fn d_task_assigned() -> String {
    "New task for {staff}: {details}".into()
}

/// A staff member who can receive contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub name: String,
    /// Transport chat id used to notify the employee.
    pub phone: String,
    /// Relative capacity.  Zero marks the employee inactive.
    #[serde(default = "d_weight")]
    pub weight: u32,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub group: Option<String>,
}

fn d_weight() -> u32 {
    1
}

/// Which roster roles form the two assignment tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Role picked round-robin and notified first.  Empty disables the tier.
    #[serde(default = "d_manager_role")]
    pub manager_role: String,
    /// Role picked by weighted draw.
    #[serde(default = "d_sales_role")]
    pub sales_role: String,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            manager_role: d_manager_role(),
            sales_role: d_sales_role(),
        }
    }
}

fn d_manager_role() -> String {
    "manager".into()
}

fn d_sales_role() -> String {
    "sales".into()
}
