pub mod email;
pub mod mercado_pago;

pub use self::email::{EmailClient, EmailClientImpl};
pub use self::mercado_pago::{MercadoPagoClient, MercadoPagoClientImpl};
