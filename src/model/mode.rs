/// What the signer is trying to establish about its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignMode {
    /// Success means no challenge matched: the token is not yet registered
    /// for any of the supplied app ids.
    Enroll,
    /// Success means some challenge matched and was signed.
    Sign,
}

impl SignMode {
    pub fn is_enroll(self) -> bool {
        self == Self::Enroll
    }
}
