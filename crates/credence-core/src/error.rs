use thiserror::Error;

/// Workspace-wide error taxonomy.
///
/// Input and state errors are returned to callers and never crash a
/// component. Consistency errors abort the current operation and, where
/// applicable, leave publishable evidence behind. Capacity errors are
/// retryable with back-off. Fatal errors halt the owning component.
#[derive(Debug, Error)]
pub enum CredenceError {
    // ── Canonical encoding ───────────────────────────────────────────────────
    #[error("canonical form exceeds {max} bytes (got {got})")]
    CanonicalTooLarge { max: usize, got: usize },

    #[error("input is not in canonical form: {0}")]
    NonCanonicalInput(String),

    // ── Input ────────────────────────────────────────────────────────────────
    #[error("input exceeds maximum size of {max} bytes")]
    TooLarge { max: usize },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("schema violation: {0}")]
    SchemaInvalid(String),

    #[error("semantic rule violated: {0}")]
    SemanticInvalid(String),

    #[error("signature does not verify")]
    BadSignature,

    #[error("issued_at outside the ingestion window: {0}")]
    ClockSkew(String),

    // ── State ────────────────────────────────────────────────────────────────
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("view is stale; last good checkpoint is epoch {last_good}")]
    StaleView { last_good: u64 },

    #[error("vouch budget exhausted for ({from}, {context}, {epoch})")]
    BudgetExceeded {
        from: String,
        context: String,
        epoch: String,
    },

    // ── Consistency ──────────────────────────────────────────────────────────
    #[error("canonical bytes do not match declared content address")]
    CanonicalMismatch,

    #[error("proof does not verify: {0}")]
    ProofInvalid(String),

    #[error("equivocation detected: {0}")]
    Equivocation(String),

    #[error("epoch {0} is unresolved; two conflicting checkpoints published")]
    UnresolvedEpoch(u64),

    // ── Capacity ─────────────────────────────────────────────────────────────
    #[error("component is busy; retry with back-off")]
    Busy,

    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    #[error("operation was cancelled")]
    Cancelled,

    // ── Fatal ────────────────────────────────────────────────────────────────
    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    // ── Serialization / storage plumbing ─────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CredenceError {
    /// Whether the caller may retry the failed operation after back-off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CredenceError::Busy | CredenceError::Timeout(_)
        )
    }

    /// Whether the owning component must halt and wait for an operator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CredenceError::StorageCorrupt(_) | CredenceError::SignerUnavailable(_)
        )
    }
}
