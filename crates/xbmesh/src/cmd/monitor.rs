use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use xbmesh_frame::IoSampleFrame;

use crate::cmd::{open_link, parse_module, MonitorArgs};
use crate::exit::{CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_sample, OutputFormat};

/// How often the main thread checks for Ctrl-C and link state.
const TICK: Duration = Duration::from_millis(200);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let only = args.remote.as_deref().map(parse_module).transpose()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let link = open_link(&args.link)?;
    let (tx, rx) = mpsc::channel::<IoSampleFrame>();
    let subscription = link.subscribe(move |sample: &IoSampleFrame| {
        tx.send(sample.clone())?;
        Ok(())
    });
    tracing::info!(%subscription, "monitoring IO samples");

    let mut printed = 0usize;
    let outcome = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(SUCCESS);
        }

        match rx.recv_timeout(TICK) {
            Ok(sample) => {
                if let Some(module) = &only {
                    if sample.address64 != module.address64 {
                        continue;
                    }
                }
                print_sample(&sample, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break Ok(SUCCESS);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !link.state().is_running() {
                    break Err(CliError::new(
                        FAILURE,
                        format!("link {} while monitoring", link.state()),
                    ));
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                break Err(CliError::new(FAILURE, "telemetry stopped"));
            }
        }
    };

    link.unsubscribe(subscription);
    link.close();
    outcome
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
