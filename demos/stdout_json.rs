use tracing::{error, info, warn};

use tracing_dd_json::config::Config;
use tracing_dd_json::init::init_tracing;

#[derive(Debug)]
struct PaymentDeclined {
    code: u16,
}

impl std::fmt::Display for PaymentDeclined {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "payment declined with code {}", self.code)
    }
}

impl std::error::Error for PaymentDeclined {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default()
        .with_allow_all_attributes(true)
        .with_logger_name("checkout")
        .with_pretty(true);
    let logger = init_tracing(config)?;

    info!("starting service");
    warn!(duration_ms = 12.5, route = "/cart", "slow request");

    let err = PaymentDeclined { code: 402 };
    error!(error = &err as &(dyn std::error::Error + 'static), user_id = 42, "checkout failed");

    logger.flush()?;
    Ok(())
}
