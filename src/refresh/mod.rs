mod scheduler;
mod single_flight;
mod ttl;

pub use scheduler::RefreshScheduler;
pub use ttl::TtlPolicy;
