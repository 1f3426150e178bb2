// MIT License - Copyright (c) 2026 Peter Wright
// Status codes for panel objects

pub mod zone;
pub mod partition;

pub use zone::ZoneStatus;
pub use partition::AreaStatus;
