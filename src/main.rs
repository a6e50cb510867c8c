use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use meshsync::demos;
use meshsync::rendering::application::MeshSubsystem;
use meshsync::rendering::deformation::cpu_kernel::CpuDeformationKernel;
use meshsync::rendering::deformation::kernel::DeformationKernel;
use meshsync::rendering::deformation::wgpu_kernel::WgpuDeformationKernel;
use meshsync::settings::{Backend, CliArgs, RuntimeFlags};
use meshsync::util::jobs::JobExecutor;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    #[cfg(feature = "tracy")]
    let _tracy = tracy_client::Client::start();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let kernel: Arc<dyn DeformationKernel> = match args.backend {
        Backend::Cpu => Arc::new(CpuDeformationKernel),
        Backend::Wgpu => Arc::new(WgpuDeformationKernel::new_blocking().context("Initializing the wgpu backend")?),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Building the tokio runtime")?;

    let mut subsystem = MeshSubsystem::new(
        RuntimeFlags::from(&args),
        JobExecutor::Runtime(runtime.handle().clone()),
        kernel,
    );

    demos::run(&mut subsystem, args.frames);
    runtime.block_on(subsystem.settle());
    Ok(())
}
