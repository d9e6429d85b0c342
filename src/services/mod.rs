// Services module - Business logic

pub mod belts;
pub mod billing;
pub mod check_in;
pub mod credentials;
pub mod email;
pub mod enrollment;
pub mod family;
pub mod pricing;
pub mod promotions;
pub mod qr_generator;
pub mod signature;
pub mod stripe;
pub mod waivers;
