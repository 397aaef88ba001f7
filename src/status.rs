//! Job status bitmask to text.

pub const JOB_STATUS_PAUSED: u32 = 0x0000_0001;
pub const JOB_STATUS_ERROR: u32 = 0x0000_0002;
pub const JOB_STATUS_DELETING: u32 = 0x0000_0004;
pub const JOB_STATUS_SPOOLING: u32 = 0x0000_0008;
pub const JOB_STATUS_PRINTING: u32 = 0x0000_0010;
pub const JOB_STATUS_OFFLINE: u32 = 0x0000_0020;
pub const JOB_STATUS_PAPEROUT: u32 = 0x0000_0040;
pub const JOB_STATUS_PRINTED: u32 = 0x0000_0080;
pub const JOB_STATUS_DELETED: u32 = 0x0000_0100;
pub const JOB_STATUS_BLOCKED_DEVQ: u32 = 0x0000_0200;
pub const JOB_STATUS_USER_INTERVENTION: u32 = 0x0000_0400;
pub const JOB_STATUS_RESTART: u32 = 0x0000_0800;
pub const JOB_STATUS_COMPLETE: u32 = 0x0000_1000;
pub const JOB_STATUS_RETAINED: u32 = 0x0000_2000;
pub const JOB_STATUS_RENDERING_LOCALLY: u32 = 0x0000_4000;

// Checked in this order; the output follows it.
const LABELS: [(u32, &str); 15] = [
    (JOB_STATUS_PAUSED, "Paused"),
    (JOB_STATUS_ERROR, "Error"),
    (JOB_STATUS_DELETING, "Deleting"),
    (JOB_STATUS_SPOOLING, "Spooling"),
    (JOB_STATUS_PRINTING, "Printing"),
    (JOB_STATUS_OFFLINE, "Printer Offline"),
    (JOB_STATUS_PAPEROUT, "Out of Paper"),
    (JOB_STATUS_PRINTED, "Printed"),
    (JOB_STATUS_DELETED, "Deleted"),
    (JOB_STATUS_BLOCKED_DEVQ, "Driver Error"),
    (JOB_STATUS_USER_INTERVENTION, "User Action Required"),
    (JOB_STATUS_RESTART, "Restarted"),
    (JOB_STATUS_COMPLETE, "Sent to Printer"),
    (JOB_STATUS_RETAINED, "Retained"),
    (JOB_STATUS_RENDERING_LOCALLY, "Rendering on Client"),
];

/// Label historically reported for a job with no status bits set.
///
/// NOTE: zero conventionally means "no flags", i.e. a job that is simply
/// queued, not a paused queue. The label is kept for compatibility with
/// existing consumers until someone confirms which meaning is wanted.
pub const ZERO_STATUS_LABEL: &str = "Queue Paused";

/// Text for a job's status. Non-blank spooler text wins; otherwise the text
/// is built from `status_code`, labels joined by ", ".
pub fn describe(status_code: u32, spooler_text: Option<&str>) -> String {
    if let Some(text) = spooler_text.filter(|text| !text.trim().is_empty()) {
        return text.to_string();
    }
    if status_code == 0 {
        return ZERO_STATUS_LABEL.to_string();
    }
    LABELS
        .iter()
        .filter(|(bit, _)| status_code & bit != 0)
        .map(|(_, label)| *label)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printing_and_paper_out() {
        assert_eq!(describe(JOB_STATUS_PRINTING | JOB_STATUS_PAPEROUT, None), "Printing, Out of Paper");
    }

    #[test]
    fn labels_follow_the_fixed_order_not_bit_order() {
        let code = JOB_STATUS_RENDERING_LOCALLY | JOB_STATUS_PAUSED | JOB_STATUS_SPOOLING | JOB_STATUS_COMPLETE;
        assert_eq!(describe(code, Some("")), "Paused, Spooling, Sent to Printer, Rendering on Client");
    }

    #[test]
    fn spooler_text_is_used_verbatim() {
        assert_eq!(describe(JOB_STATUS_ERROR, Some(" Toner low ")), " Toner low ");
    }

    #[test]
    fn blank_spooler_text_falls_back_to_the_bitmask() {
        assert_eq!(describe(JOB_STATUS_ERROR | JOB_STATUS_OFFLINE, Some("   \t")), "Error, Printer Offline");
    }

    // Zero means "no flags" by convention; this pins the historical label
    // rather than endorsing it.
    #[test]
    fn zero_bitmask_keeps_the_historical_queue_paused_label() {
        assert_eq!(describe(0, None), "Queue Paused");
    }

    #[test]
    fn unknown_bits_are_ignored() {
        assert_eq!(describe(0x8000_0000 | JOB_STATUS_RETAINED, None), "Retained");
        assert_eq!(describe(0x8000_0000, None), "");
    }

    #[test]
    fn every_label_appears_once_for_a_full_mask() {
        let text = describe(0x7FFF, None);
        assert_eq!(text.split(", ").count(), 15);
        assert!(text.starts_with("Paused, Error, Deleting"));
        assert!(text.ends_with("Retained, Rendering on Client"));
    }
}
