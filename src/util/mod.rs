/// Background work and the queues its results are committed through.
pub mod jobs;
pub mod weak_cache;
