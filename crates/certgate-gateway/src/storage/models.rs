//! Data models for gateway storage.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CertificateRecord {
    /// Local monotonic id assigned at insert; not the 32-byte certificate id.
    pub id: i64,
    /// The exact serialized submission request, preserved byte-exact.
    pub raw_request: Vec<u8>,
    /// Derived JSON summary used only for display and metrics.
    pub metadata: String,
    /// The 32-byte certificate identifier computed at intercept time.
    pub cert_id: Vec<u8>,
    /// Unix milliseconds.
    pub received_at: i64,
    /// Unix milliseconds; set once when the record is forwarded or overridden.
    pub processed_at: Option<i64>,
}
