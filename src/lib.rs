// Reservation core: resilient PMS gateway, distributed lock manager,
// deterministic pricing and the guest-facing reservation workflow engine.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod models;
pub mod pms;
pub mod pricing;
pub mod rules;
pub mod wire;
pub mod workflow;

// Re-export key types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{
    BusinessRules, CircuitBreakerConfig, EngineConfig, GatewayConfig, LockConfig, PricingConfig,
    RetryConfig,
};
pub use error::{BusinessRuleViolation, GatewayError, LockError, WorkflowError};
pub use gateway::{GatewayStatsSnapshot, PmsGateway};
pub use lock::{LockGuard, LockManager, LockToken};
pub use models::{
    Availability, AvailabilityQuery, PricingCalculation, QuotedOption, RateOption, Reservation,
    ReservationDraft, ReservationStatus, RoomOccupancy,
};
pub use pms::{PmsClient, RestPmsClient};
pub use pricing::calculate_pricing;
pub use rules::validate_stay;
pub use workflow::{Field, StepResult, WorkflowData, WorkflowEngine, WorkflowState};
