//! Withdrawal FSM State Definitions
//!
//! State IDs are designed for PostgreSQL storage as SMALLINT.
//! Terminal states: PAID (50), REJECTED (-10), CANCELED (-20), EXPIRED (-30)

use std::fmt;

/// Withdrawal lifecycle states
///
/// Happy path runs through the ascending positive IDs; negative IDs are the
/// terminal failure exits, each of which carries a compensating ledger
/// credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum WithdrawalStatus {
    /// Request recorded, ledger debit held
    Requested = 10,

    /// OTP issued for this withdrawal (otp_id recorded atomically)
    OtpSent = 20,

    /// OTP confirmed - eligible for admin review
    OtpVerified = 30,

    /// Admin approved - awaiting payout execution
    Approved = 40,

    /// Terminal: payout executed and attested with a tx hash
    Paid = 50,

    /// Terminal: admin rejected, funds restored
    Rejected = -10,

    /// Terminal: user canceled before OTP issuance, funds restored
    Canceled = -20,

    /// Terminal: expirer reclaimed a stale request, funds restored
    Expired = -30,
}

impl WithdrawalStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Paid
                | WithdrawalStatus::Rejected
                | WithdrawalStatus::Canceled
                | WithdrawalStatus::Expired
        )
    }

    /// States whose amount still counts against the user's available balance
    /// (everything not reversed by a compensating credit).
    pub fn holding_funds() -> &'static [WithdrawalStatus] {
        &[
            WithdrawalStatus::Requested,
            WithdrawalStatus::OtpSent,
            WithdrawalStatus::OtpVerified,
            WithdrawalStatus::Approved,
            WithdrawalStatus::Paid,
        ]
    }

    /// States counted as pending: not yet paid, not yet reversed.
    pub fn pending() -> &'static [WithdrawalStatus] {
        &[
            WithdrawalStatus::Requested,
            WithdrawalStatus::OtpSent,
            WithdrawalStatus::OtpVerified,
            WithdrawalStatus::Approved,
        ]
    }

    /// States the expiry sweep reclaims once they go stale.
    pub fn expirable() -> &'static [WithdrawalStatus] {
        &[WithdrawalStatus::Requested, WithdrawalStatus::OtpSent]
    }

    /// States the owning user may still cancel (pre-confirmation).
    pub fn cancelable() -> &'static [WithdrawalStatus] {
        &[WithdrawalStatus::Requested, WithdrawalStatus::OtpSent]
    }

    /// States an admin may still reject (everything pre-payout).
    pub fn rejectable() -> &'static [WithdrawalStatus] {
        &[
            WithdrawalStatus::Requested,
            WithdrawalStatus::OtpSent,
            WithdrawalStatus::OtpVerified,
            WithdrawalStatus::Approved,
        ]
    }

    /// Whether a terminal state carries a compensating credit.
    #[inline]
    pub fn is_compensated(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Rejected | WithdrawalStatus::Canceled | WithdrawalStatus::Expired
        )
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(WithdrawalStatus::Requested),
            20 => Some(WithdrawalStatus::OtpSent),
            30 => Some(WithdrawalStatus::OtpVerified),
            40 => Some(WithdrawalStatus::Approved),
            50 => Some(WithdrawalStatus::Paid),
            -10 => Some(WithdrawalStatus::Rejected),
            -20 => Some(WithdrawalStatus::Canceled),
            -30 => Some(WithdrawalStatus::Expired),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Requested => "requested",
            WithdrawalStatus::OtpSent => "otp_sent",
            WithdrawalStatus::OtpVerified => "otp_verified",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Canceled => "canceled",
            WithdrawalStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for WithdrawalStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        WithdrawalStatus::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [WithdrawalStatus; 8] = [
        WithdrawalStatus::Requested,
        WithdrawalStatus::OtpSent,
        WithdrawalStatus::OtpVerified,
        WithdrawalStatus::Approved,
        WithdrawalStatus::Paid,
        WithdrawalStatus::Rejected,
        WithdrawalStatus::Canceled,
        WithdrawalStatus::Expired,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(WithdrawalStatus::Paid.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
        assert!(WithdrawalStatus::Canceled.is_terminal());
        assert!(WithdrawalStatus::Expired.is_terminal());

        assert!(!WithdrawalStatus::Requested.is_terminal());
        assert!(!WithdrawalStatus::OtpSent.is_terminal());
        assert!(!WithdrawalStatus::OtpVerified.is_terminal());
        assert!(!WithdrawalStatus::Approved.is_terminal());
    }

    #[test]
    fn test_holding_funds_excludes_reversed() {
        let holding = WithdrawalStatus::holding_funds();
        assert!(holding.contains(&WithdrawalStatus::Paid));
        assert!(holding.contains(&WithdrawalStatus::Requested));
        assert!(!holding.contains(&WithdrawalStatus::Rejected));
        assert!(!holding.contains(&WithdrawalStatus::Canceled));
        assert!(!holding.contains(&WithdrawalStatus::Expired));
    }

    #[test]
    fn test_pending_excludes_paid() {
        let pending = WithdrawalStatus::pending();
        assert!(!pending.contains(&WithdrawalStatus::Paid));
        assert!(pending.contains(&WithdrawalStatus::Approved));
    }

    #[test]
    fn test_expirable_matches_sweep_filter() {
        assert_eq!(
            WithdrawalStatus::expirable(),
            &[WithdrawalStatus::Requested, WithdrawalStatus::OtpSent]
        );
    }

    #[test]
    fn test_compensated_terminals() {
        assert!(WithdrawalStatus::Rejected.is_compensated());
        assert!(WithdrawalStatus::Canceled.is_compensated());
        assert!(WithdrawalStatus::Expired.is_compensated());
        assert!(!WithdrawalStatus::Paid.is_compensated());
        assert!(!WithdrawalStatus::Requested.is_compensated());
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in ALL {
            let id = state.id();
            let recovered = WithdrawalStatus::from_id(id).unwrap();
            assert_eq!(state, recovered);
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(WithdrawalStatus::from_id(999).is_none());
        assert!(WithdrawalStatus::from_id(0).is_none());
        assert!(WithdrawalStatus::from_id(-999).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(WithdrawalStatus::Requested.to_string(), "requested");
        assert_eq!(WithdrawalStatus::OtpSent.to_string(), "otp_sent");
        assert_eq!(WithdrawalStatus::Paid.to_string(), "paid");
        assert_eq!(WithdrawalStatus::Expired.to_string(), "expired");
    }
}
