//! Classification of `qdisc del dev <device> root` failures.
//!
//! Deleting the root qdisc of a device that has none fails, and the message depends on the
//! kernel and iproute2 versions. Those failures mean there is nothing to flush.

/// Messages printed by `tc` when the device has no root qdisc to delete.
pub const NOTHING_TO_DELETE: &[&str] = &[
    // iproute2 >= 5.x
    "Cannot delete qdisc with handle of zero.",
    // older versions
    "RTNETLINK answers: No such file or directory",
];

/// Returns `true` if the output of a failed flush only says there was nothing to delete.
pub fn is_nothing_to_delete(output: &str) -> bool {
    NOTHING_TO_DELETE.iter().any(|pattern| output.contains(pattern))
}
