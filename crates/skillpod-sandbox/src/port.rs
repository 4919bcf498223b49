//! Deterministic host port derivation.
//!
//! The computed port is an optimistic default. Once an environment exists, the port
//! the runtime actually bound always wins.

/// Lowest port handed out.
pub const PORT_BASE: u16 = 3000;
/// Number of ports in the range `[PORT_BASE, PORT_BASE + PORT_SPAN)`.
pub const PORT_SPAN: i64 = 1000;

/// Map a skill identity to a port in `[3000, 3999]`.
///
/// 32-bit rolling hash (`h * 31 + unit`, wrapping) over UTF-16 code units, absolute
/// value taken in 64 bits.
pub fn port_for(skill: &str) -> u16 {
    let hash = skill
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let offset = (i64::from(hash)).abs() % PORT_SPAN;
    PORT_BASE + offset as u16
}
