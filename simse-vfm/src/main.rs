use clap::Parser;

use simse_vfm::config::CliArgs;
use simse_vfm::fs::FileManager;
use simse_vfm::server::VfmServer;
use simse_vfm::transport::NdjsonTransport;

fn main() {
	let args = CliArgs::parse();

	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
		)
		.init();

	let manager = match FileManager::open(args.to_manager_config()) {
		Ok(m) => m,
		Err(e) => {
			tracing::error!("Failed to open file system: {}", e);
			std::process::exit(1);
		}
	};

	let transport = NdjsonTransport::new();
	let mut server = VfmServer::new(transport, manager);

	tracing::info!("simse-vfm-engine ready");

	if let Err(e) = server.run() {
		tracing::error!("Server error: {}", e);
		std::process::exit(1);
	}
}
