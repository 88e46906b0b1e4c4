//! The `tls_flags` bitset tracked per FTP session (spec.md §3 "Session Flags").

use bitflags::bitflags;

bitflags! {
    /// Per-session FTPS state flags. Mutate only through [`SessionFlags`]'s
    /// own setters so the invariants documented on each flag keep holding -
    /// never flip raw bits from outside this module.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionFlags: u32 {
        /// The control channel is currently running over TLS.
        const ON_CTRL                   = 0b0000_0000_0001;
        /// The active data channel is currently running over TLS.
        const ON_DATA                   = 0b0000_0000_0010;
        /// `PBSZ 0` has been accepted on this session.
        const PBSZ_OK                   = 0b0000_0000_0100;
        /// This session is required to use TLS (informational mirror of policy).
        const TLS_REQUIRED              = 0b0000_0000_1000;
        /// The client certificate is mandatory for this session.
        const VERIFY_CLIENT_REQUIRED    = 0b0000_0001_0000;
        /// A verified client certificate satisfies USER/PASS.
        const NO_PASSWD_NEEDED          = 0b0000_0010_0000;
        /// `PROT P` is in effect; data channels must negotiate TLS.
        const NEED_DATA_PROT            = 0b0000_0100_0000;
        /// A renegotiation is in flight on the control channel.
        const CTRL_RENEGOTIATING        = 0b0000_1000_0000;
        /// A renegotiation is in flight on the data channel.
        const DATA_RENEGOTIATING        = 0b0001_0000_0000;
        /// The client issued `CCC`; the control channel is now plaintext.
        const HAVE_CCC                  = 0b0010_0000_0000;
        /// The server verifies its own identity against an expected name (rare, client-style use).
        const VERIFY_SERVER             = 0b0100_0000_0000;
        /// As `VERIFY_SERVER`, but skip reverse-DNS confirmation.
        const VERIFY_SERVER_NO_DNS      = 0b1000_0000_0000;
        /// A client certificate is requested but not mandatory.
        const VERIFY_CLIENT_OPTIONAL    = 0b1_0000_0000_0000;
    }
}

/// Errors returned when an attempted flag mutation would violate an
/// invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlagInvariantError {
    /// `HAVE_CCC` and `ON_CTRL` cannot both be set.
    #[error("HAVE_CCC implies the control channel is no longer on TLS")]
    CccImpliesNotOnCtrl,
    /// `NEED_DATA_PROT` requires either `ON_CTRL` or `HAVE_CCC`.
    #[error("NEED_DATA_PROT requires a secured control channel or a completed CCC")]
    DataProtRequiresSecuredControl,
    /// `VERIFY_CLIENT_REQUIRED` and `VERIFY_CLIENT_OPTIONAL` are mutually exclusive.
    #[error("VERIFY_CLIENT_REQUIRED and VERIFY_CLIENT_OPTIONAL are mutually exclusive")]
    ClientVerifyModeConflict,
}

impl SessionFlags {
    /// Marks the control channel as now running over TLS, clearing `HAVE_CCC`.
    pub fn set_on_ctrl(&mut self) {
        self.remove(SessionFlags::HAVE_CCC);
        self.insert(SessionFlags::ON_CTRL);
    }

    /// Records a completed `CCC`: the control channel reverts to plaintext.
    pub fn set_have_ccc(&mut self) {
        self.remove(SessionFlags::ON_CTRL);
        self.insert(SessionFlags::HAVE_CCC);
    }

    /// Sets or clears `NEED_DATA_PROT`, enforcing its invariant.
    pub fn set_need_data_prot(&mut self, on: bool) -> Result<(), FlagInvariantError> {
        if on && !self.intersects(SessionFlags::ON_CTRL | SessionFlags::HAVE_CCC) {
            return Err(FlagInvariantError::DataProtRequiresSecuredControl);
        }
        self.set(SessionFlags::NEED_DATA_PROT, on);
        Ok(())
    }

    /// Sets the client-verification mode, enforcing mutual exclusion.
    pub fn set_client_verify_required(&mut self, required: bool) -> Result<(), FlagInvariantError> {
        if required && self.contains(SessionFlags::VERIFY_CLIENT_OPTIONAL) {
            return Err(FlagInvariantError::ClientVerifyModeConflict);
        }
        self.set(SessionFlags::VERIFY_CLIENT_REQUIRED, required);
        Ok(())
    }

    /// Sets the optional client-verification mode, enforcing mutual exclusion.
    pub fn set_client_verify_optional(&mut self, optional: bool) -> Result<(), FlagInvariantError> {
        if optional && self.contains(SessionFlags::VERIFY_CLIENT_REQUIRED) {
            return Err(FlagInvariantError::ClientVerifyModeConflict);
        }
        self.set(SessionFlags::VERIFY_CLIENT_OPTIONAL, optional);
        Ok(())
    }

    /// True if the control channel is presently protected (TLS and not CCC'd away).
    pub fn ctrl_is_secured(&self) -> bool {
        self.contains(SessionFlags::ON_CTRL) && !self.contains(SessionFlags::HAVE_CCC)
    }

    /// Marks whether a renegotiation is in flight on the control channel.
    pub fn set_ctrl_renegotiating(&mut self, on: bool) {
        self.set(SessionFlags::CTRL_RENEGOTIATING, on);
    }

    /// Marks whether a renegotiation is in flight on the data channel.
    pub fn set_data_renegotiating(&mut self, on: bool) {
        self.set(SessionFlags::DATA_RENEGOTIATING, on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccc_clears_on_ctrl() {
        let mut f = SessionFlags::empty();
        f.set_on_ctrl();
        assert!(f.contains(SessionFlags::ON_CTRL));
        f.set_have_ccc();
        assert!(!f.contains(SessionFlags::ON_CTRL));
        assert!(f.contains(SessionFlags::HAVE_CCC));
    }

    #[test]
    fn data_prot_requires_secured_control() {
        let mut f = SessionFlags::empty();
        assert_eq!(f.set_need_data_prot(true), Err(FlagInvariantError::DataProtRequiresSecuredControl));
        f.set_on_ctrl();
        assert!(f.set_need_data_prot(true).is_ok());
        assert!(f.contains(SessionFlags::NEED_DATA_PROT));
    }

    #[test]
    fn data_prot_allowed_after_ccc() {
        let mut f = SessionFlags::empty();
        f.set_on_ctrl();
        f.set_have_ccc();
        assert!(f.set_need_data_prot(true).is_ok());
    }

    #[test]
    fn client_verify_modes_are_exclusive() {
        let mut f = SessionFlags::empty();
        f.set_client_verify_required(true).unwrap();
        assert_eq!(
            f.set_client_verify_optional(true),
            Err(FlagInvariantError::ClientVerifyModeConflict)
        );
    }
}
