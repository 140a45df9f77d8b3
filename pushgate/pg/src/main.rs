#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

//! pg is a command line application to dispatch push requests to APNs.
//!
//! Given a certificate at `./key.pem` and a request in `request.json`,
//!
//! ```
//! $ pg -f request.json
//! ```
//!
//! Or pipe the request and pick the gateway with environment variables,
//!
//! ```
//! $ export APNS_CERTIFICATE=/etc/pushgate/key.pem
//! $ export APNS_ENVIRONMENT=production
//! $ echo '{"tokens":["..."],"platform":1,"message":"hello"}' | pg -v
//! ```
//!
//! For more information,
//!
//! ```
//! $ pg -h
//! ```

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use log::{debug, Level};
use logging_timer::{finish, stimer};

use pushgate::{ApnsConfig, Dispatcher, Environment, FailureMode, PushRequest};

#[doc(hidden)]
#[derive(Debug, Parser)]
#[clap(about, author, version)]
struct Opts {
    /// Push request in JSON. Read from standard input when omitted.
    #[clap(short, long)]
    file: Option<PathBuf>,
    /// PEM file holding the APNs certificate and its private key.
    #[clap(short, long, env = "APNS_CERTIFICATE", default_value = "./key.pem")]
    certificate: PathBuf,
    /// APNs environment, development or production.
    #[clap(short, long, env = "APNS_ENVIRONMENT", default_value = "development")]
    environment: Environment,
    /// After a transport error, abort the batch or continue with the next token.
    #[clap(long, env = "PUSHGATE_MODE", default_value = "abort")]
    mode: FailureMode,
    /// Timeout of each APNs request in seconds, at least 1.
    #[clap(
        long,
        env = "PUSHGATE_TIMEOUT",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,
    /// Verbose, print the report as JSON.
    #[clap(short, long)]
    verbose: bool,
}

fn read_request(opts: &Opts) -> anyhow::Result<PushRequest> {
    use std::io::Read as _;

    let content = if let Some(ref p) = opts.file {
        debug!("load push request from {p:?}");
        fs::read_to_string(p)?
    } else if atty::isnt(atty::Stream::Stdin) {
        debug!("load push request from standard input");
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        bail!("no push request, give --file or pipe it to standard input");
    };
    Ok(serde_json::from_str(&content)?)
}

#[doc(hidden)]
fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opts: Opts = Opts::parse();
    let req = read_request(&opts)?;

    let mut dispatcher = Dispatcher::from_config(ApnsConfig {
        certificate: opts.certificate.clone(),
        environment: opts.environment,
        timeout: Duration::from_secs(opts.timeout),
    });
    dispatcher.mode = opts.mode;

    let tmr = stimer!(Level::Debug; "DISPATCH");
    let report = dispatcher.dispatch(&req)?;
    finish!(tmr);

    if opts.verbose {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !report.is_success() {
        bail!(
            "{} sent, {} rejected, {} failed, {} skipped",
            report.sent(),
            report.rejected(),
            report.failed(),
            report.skipped()
        );
    }
    Ok(())
}
