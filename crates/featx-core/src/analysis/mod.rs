//! Built-in analysis plugins
//!
//! Small, dependency-free algorithms registered under the `featx` library:
//!
//! | Key | Domain | Outputs |
//! |---|---|---|
//! | `featx:power` | time | `rms`, `peak` |
//! | `featx:zerocrossing` | time | `counts`, `zerocrossings` |
//! | `featx:spectralcentroid` | frequency | `logcentroid`, `linearcentroid` |

mod power;
mod spectral_centroid;
mod zero_crossing;

pub use power::Power;
pub use spectral_centroid::SpectralCentroid;
pub use zero_crossing::ZeroCrossing;

use crate::plugin::PluginRegistry;

/// Library namespace of the built-in plugins
pub const LIBRARY: &str = "featx";

/// Register every built-in plugin with `registry`
pub fn register_builtin(registry: &mut PluginRegistry) {
    registry.register(format!("{LIBRARY}:power"), |rate| Box::new(Power::new(rate)));
    registry.register(format!("{LIBRARY}:zerocrossing"), |rate| {
        Box::new(ZeroCrossing::new(rate))
    });
    registry.register(format!("{LIBRARY}:spectralcentroid"), |rate| {
        Box::new(SpectralCentroid::new(rate))
    });
}
