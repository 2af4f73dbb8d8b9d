pub mod handlers;
pub mod interpreter;
pub mod job_match;
pub mod pipeline;
