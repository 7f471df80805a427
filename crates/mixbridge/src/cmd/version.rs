use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mixbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: mixbridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "target: {}",
        option_env!("MIXBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "invoke_timeout_ms: {}",
        mixbridge::channel::DEFAULT_INVOKE_TIMEOUT.as_millis()
    );
    println!("features: cli=true");

    Ok(SUCCESS)
}
