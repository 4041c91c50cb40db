mod google;
mod mercadopago;
mod twilio;

pub use google::*;
pub use mercadopago::*;
pub use twilio::*;
