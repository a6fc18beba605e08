//! Eligibility filter.

use acctfetch_shared::RawRecord;

/// Whether `record` should be enriched.
///
/// Accounts carrying any custom claim are administrative and are left out
/// of the result entirely. Pure; safe to call from any task.
pub fn is_eligible(record: &RawRecord) -> bool {
    record.privilege_marker().is_none()
}
