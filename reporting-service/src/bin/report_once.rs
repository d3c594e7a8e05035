use std::{env, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use reporting_client::ReportingClient;
use reporting_service::{
    config::{ApiEnv, AppConfig},
    filters::{PageQuery, DEFAULT_RESOLUTION},
    microgrids::MicrogridRegistry,
    observability,
    pages::Page,
    ReportPipeline, ReportService,
};

const USAGE: &str = "usage: report_once [--page <key>] <microgrid_id> <start_date> <end_date> \
                     [resolution] [timezone]";

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut args: Vec<String> = env::args().collect();
    let page = if args.get(1).map(String::as_str) == Some("--page") {
        if args.len() < 3 {
            bail!(USAGE);
        }
        let key = args.remove(2);
        args.remove(1);
        Page::parse(&key)?
    } else {
        Page::Reporting
    };
    if args.len() < 4 {
        bail!(USAGE);
    }
    let query = PageQuery {
        microgrid_id: Some(
            args[1]
                .parse()
                .with_context(|| format!("invalid microgrid id '{}'", args[1]))?,
        ),
        start_date: Some(parse_date(&args[2])?),
        end_date: Some(parse_date(&args[3])?),
        resolution: Some(
            args.get(4)
                .cloned()
                .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string()),
        ),
        timezone: args.get(5).cloned(),
    };

    let cfg = AppConfig::load()?;
    let api = ApiEnv::from_env()?;
    let microgrids = MicrogridRegistry::load(&api.microgrid_config_dir)?;
    let client = ReportingClient::connect(api.api_url, api.credentials, cfg.client.settings())?;
    let service = ReportService::new(
        Arc::new(microgrids),
        ReportPipeline::new(Arc::new(client)),
    )
    .with_session_idle_timeout(cfg.http.session_idle_timeout());

    let session = service.session("report_once");
    let output = page.render(&session, &service, &query).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
