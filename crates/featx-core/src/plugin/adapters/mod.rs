//! Adapters layered around raw plugins
//!
//! The engine composes them in a fixed order, innermost first:
//! input domain (frequency-domain plugins only), buffering, channel,
//! summarising. See [`wrap`].

mod buffering;
mod channel;
mod input_domain;
mod summarise;
mod window;

pub use buffering::{BufferingAdapter, DEFAULT_PLUGIN_BLOCK_SIZE};
pub use channel::ChannelAdapter;
pub use input_domain::{InputDomainAdapter, DEFAULT_FREQUENCY_BLOCK_SIZE};
pub use summarise::SummarisingAdapter;
pub use window::Window;

use super::{AnalysisPlugin, InputDomain};
use crate::transform::WindowType;

/// A plugin wrapped in the full adapter chain, plus the step and block size
/// the raw plugin will actually run at
pub struct WrappedPlugin {
    pub plugin: SummarisingAdapter,
    pub step_size: usize,
    pub block_size: usize,
}

/// Wrap a raw plugin in the adapter chain
///
/// Non-zero `step_size`/`block_size` override the plugin's preferred
/// geometry. Summarisation starts disabled.
pub fn wrap(
    plugin: Box<dyn AnalysisPlugin>,
    window: WindowType,
    step_size: usize,
    block_size: usize,
) -> WrappedPlugin {
    let plugin: Box<dyn AnalysisPlugin> = match plugin.input_domain() {
        InputDomain::Frequency => {
            let mut adapter = InputDomainAdapter::new(plugin);
            adapter.set_window_type(window);
            Box::new(adapter)
        }
        InputDomain::Time => plugin,
    };

    let mut buffering = BufferingAdapter::new(plugin);
    buffering.set_plugin_step_size(step_size);
    buffering.set_plugin_block_size(block_size);
    let (resolved_step, resolved_block) = buffering.actual_step_and_block_sizes();
    if step_size == 0 && resolved_step > resolved_block {
        // preferred step no longer fits the overridden block
        buffering.set_plugin_step_size(resolved_block);
    }
    let (step_size, block_size) = buffering.actual_step_and_block_sizes();

    let channel = ChannelAdapter::new(Box::new(buffering));
    WrappedPlugin {
        plugin: SummarisingAdapter::new(Box::new(channel)),
        step_size,
        block_size,
    }
}
