//! Output formatting for CLI responses.
//!
//! Supports both human-readable and JSON output formats for
//! integration with scripts and other tools.

use slotlease::AcquiredLease;
use slotlease::SlotState;
use slotlease::SlotStatus;

/// Trait for types that can be output in multiple formats.
pub trait Outputable {
    /// Convert to JSON value for structured output.
    fn to_json(&self) -> serde_json::Value;

    /// Convert to human-readable string.
    fn to_human(&self) -> String;
}

/// Print a value in the appropriate format.
pub fn print_output<T: Outputable>(value: &T, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&value.to_json())
                .unwrap_or_else(|e| { format!("{{\"error\": \"failed to serialize: {}\"}}", e) })
        );
    } else {
        println!("{}", value.to_human());
    }
}

/// Print a success message.
pub fn print_success(message: &str, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "success",
                "message": message
            })
        );
    } else {
        println!("{}", message);
    }
}

/// Print a failure message to stderr.
pub fn print_failure(operation: &str, error: &str, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "failure",
                "operation": operation,
                "error": error
            })
        );
    } else {
        eprintln!("{} failed: {}", operation, error);
    }
}

/// A freshly acquired lease.
pub struct LeaseOutput {
    pub lease: AcquiredLease,
}

impl Outputable for LeaseOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.lease).unwrap_or(serde_json::Value::Null)
    }

    fn to_human(&self) -> String {
        // Token alone on stdout so `$(slotlease acquire ...)` captures it
        self.lease.token.to_string()
    }
}

/// Result of a renewal.
pub struct RenewOutput {
    pub target: String,
    pub deadline_ms: u64,
}

impl Outputable for RenewOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "target": self.target,
            "deadline_ms": self.deadline_ms
        })
    }

    fn to_human(&self) -> String {
        format!("Renewed '{}' until {}", self.target, self.deadline_ms)
    }
}

/// Slot table for one target.
pub struct StatusOutput {
    pub target: String,
    pub now_ms: u64,
    pub slots: Vec<SlotStatus>,
}

impl Outputable for StatusOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "target": self.target,
            "slots": serde_json::to_value(&self.slots).unwrap_or(serde_json::Value::Null)
        })
    }

    fn to_human(&self) -> String {
        let held = self.slots.iter().filter(|s| matches!(s.state, SlotState::Held { .. })).count();
        let mut out = format!("{}: {}/{} slots held\n", self.target, held, self.slots.len());
        out.push_str(&format!("{:<6} {:<10} {:<24} {}", "SLOT", "STATE", "CLIENT", "EXPIRES"));

        for slot in &self.slots {
            let line = match &slot.state {
                SlotState::Free => format!("{:<6} {:<10}", slot.index, "free"),
                SlotState::Held { lease } => format!(
                    "{:<6} {:<10} {:<24} in {}ms",
                    slot.index,
                    "held",
                    lease.client,
                    lease.remaining_ms(self.now_ms)
                ),
                SlotState::Expired { lease } => format!(
                    "{:<6} {:<10} {:<24} {}ms ago",
                    slot.index,
                    "expired",
                    lease.client,
                    self.now_ms.saturating_sub(lease.deadline_ms)
                ),
                SlotState::Unreadable { reason } => format!("{:<6} {:<10} {}", slot.index, "error", reason),
            };
            out.push('\n');
            out.push_str(&line);
        }
        out
    }
}
