use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use nildb::state::LogLevelControl;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime filter control backed by a `tracing_subscriber` reload handle.
pub struct ReloadLogControl {
    handle: FilterHandle,
    current: Mutex<String>,
}

impl LogLevelControl for ReloadLogControl {
    fn set(&self, directive: &str) -> Result<(), String> {
        let filter = EnvFilter::try_new(directive).map_err(|e| e.to_string())?;
        self.handle.reload(filter).map_err(|e| e.to_string())?;
        directive.clone_into(&mut self.current.lock());
        Ok(())
    }

    fn current(&self) -> String {
        self.current.lock().clone()
    }
}

/// Initialise the global subscriber and return the runtime control.
///
/// The CLI `-v` count escalates the base directive from config:
/// `-vv` forces debug, `-vvv` trace.
///
/// # Errors
/// An unparsable base directive.
pub fn init(base_directive: &str, verbosity: u8) -> anyhow::Result<ReloadLogControl> {
    let directive = match verbosity {
        0 | 1 => base_directive.to_owned(),
        2 => "debug".to_owned(),
        _ => "trace".to_owned(),
    };
    let filter = EnvFilter::try_new(&directive)?;
    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(ReloadLogControl {
        handle,
        current: Mutex::new(directive),
    })
}
