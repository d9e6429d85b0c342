// Models module - Database entity representations

pub mod belt_history;
pub mod check_in;
pub mod family_account;
pub mod gym_class;
pub mod member;
pub mod waiver;
pub mod webhook_event;

pub use belt_history::MemberBeltHistory;
pub use check_in::CheckIn;
pub use family_account::FamilyAccount;
pub use gym_class::GymClass;
pub use member::Member;
pub use waiver::Waiver;
pub use webhook_event::WebhookEventLog;
