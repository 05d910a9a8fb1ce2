/*!
booster-hook: run build commands with a pre-loaded interception library.

Every process in the launched tree inherits the loader pre-load variable plus
the hook library and config paths, so compiler invocations spawned at any depth
can be redirected to a compile farm by the injected library. When the farm is
unreachable or no rule matches, the injected side runs the compiler locally.

```no_run
use booster_hook::{report, run_process, EnvironmentOverlay};

let overlay = EnvironmentOverlay::new().with_farm_hosts("--randomize 127.0.0.1:3632,lzo");
let result = run_process("/opt/hook/hook.so", "/opt/hook/config.json", overlay, "make");
let outcome = report(result);
std::process::exit(i32::from(outcome.exit_code()));
```
*/

pub mod color;
pub mod config;
pub mod doctor;
pub mod errors;
pub mod farm;
pub mod inject;
pub mod launcher;
pub mod overlay;
pub mod report;
mod signals;
pub mod telemetry;
pub mod util;

pub use color::{color_enabled_stderr, paint, set_color_mode, ColorMode, Tone};
pub use config::{
    load_config, parse_config, FallbackPolicy, HookConfig, HookRule, LogLevel, LogSettings,
    RuleAction,
};
pub use errors::{exit_code_for_hook_error, exit_code_for_io_error, HookError, Stage};
pub use inject::{
    platform_runtime, InjectableRuntime, ObjectFormat, PreloadRuntime, UnsupportedRuntime,
};
pub use launcher::{
    launch, launch_prepared, launch_with, run_process, ChildStatus, CommandLine, LaunchRequest,
    LaunchResult, PreparedLaunch, ENV_CONFIG_PATH, ENV_PRELOAD_LIBRARY,
};
pub use overlay::{merge, parse_assignment, EnvSnapshot, EnvironmentOverlay, FARM_HOSTS_KEY};
pub use report::{classify, diagnostic_line, report, Outcome};
pub use util::{shell_escape, shell_join};
