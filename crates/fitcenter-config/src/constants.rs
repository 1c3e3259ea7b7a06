// ============================================================================
// Configuration Defaults
// ============================================================================

use std::time::Duration;

pub const DEFAULT_GATEWAY_PORT: u16 = 8080;
pub const DEFAULT_GATEWAY_CONFIG_PATH: &str = "config/gateway.yaml";
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on how long in-flight requests may drain after a shutdown signal.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

pub const DEFAULT_AUTH_HOST: &str = "0.0.0.0";
pub const DEFAULT_AUTH_PORT: u16 = 8006;
pub const DEFAULT_JWT_EXPIRE_HOURS: i64 = 24;
pub const DEFAULT_MAX_ACTIVE_ADMINS: usize = 3;
pub const DEFAULT_SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Built-in prefix table: `(prefix, service)`.
pub const DEFAULT_ROUTES: &[(&str, &str)] = &[
    ("/api/v1/members", "member"),
    ("/api/v1/memberships", "member"),
    ("/api/v1/classes", "class"),
    ("/api/v1/schedules", "class"),
    ("/api/v1/bookings", "class"),
    ("/api/v1/facilities", "facility"),
    ("/api/v1/equipment", "facility"),
    ("/api/v1/attendance", "facility"),
    ("/api/v1/staff", "staff"),
    ("/api/v1/trainers", "staff"),
    ("/api/v1/qualifications", "staff"),
    ("/api/v1/training-sessions", "staff"),
    ("/api/v1/payments", "payment"),
    ("/api/v1/payment-types", "payment"),
    ("/api/v1/transactions", "payment"),
    ("/api/v1/auth", "auth"),
];

/// Default backends: `(service, url, url override env var)`.
pub const DEFAULT_SERVICES: &[(&str, &str, &str)] = &[
    ("member", "http://localhost:8001", "MEMBER_SERVICE_URL"),
    ("staff", "http://localhost:8002", "STAFF_SERVICE_URL"),
    ("class", "http://localhost:8003", "CLASS_SERVICE_URL"),
    ("facility", "http://localhost:8004", "FACILITY_SERVICE_URL"),
    ("payment", "http://localhost:8005", "PAYMENT_SERVICE_URL"),
    ("auth", "http://localhost:8006", "AUTH_SERVICE_URL"),
];

/// Auth endpoints the gateway bearer guard never intercepts.
pub const PUBLIC_AUTH_PATHS: &[&str] = &[
    "/api/v1/auth/login",
    "/api/v1/auth/register",
    "/api/v1/auth/validate",
];
