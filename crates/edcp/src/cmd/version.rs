use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("edcp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: edcp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("EDCP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rs_codec: RS({}, {})",
        edcp::fec::CODEWORD_LEN,
        edcp::fec::MAX_DATA_LEN
    );
    println!("max_fragments: {}", edcp::pft::DEFAULT_MAX_FRAGMENTS);

    Ok(SUCCESS)
}
