mod interactions;
mod queries;
mod scheduler;
