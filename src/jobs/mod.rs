// Background jobs

pub mod waiver_reminders;
