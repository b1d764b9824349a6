//! Response definitions
//!
//! The verifier's verdict on one reported transition.

/// Verifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VerifyStatus {
    /// Transition is consistent with mutual exclusion
    Ok = 0x00,
    /// Transition overlaps another holder's
    Violation = 0x01,
}

impl VerifyStatus {
    /// Any nonzero byte is a violation
    pub fn from_u8(code: u8) -> Self {
        if code == 0 {
            VerifyStatus::Ok
        } else {
            VerifyStatus::Violation
        }
    }

    pub fn is_ok(self) -> bool {
        self == VerifyStatus::Ok
    }
}
