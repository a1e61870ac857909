// Domain layer: shared types and the ratelimiter ports implemented under core/.

pub mod model;
pub mod ports;
