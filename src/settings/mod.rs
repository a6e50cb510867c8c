use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "meshsync")]
#[command(version)]
#[command(about = "Drives a scripted scene of blend shape and skinned meshes through the mesh subsystem")]
pub struct CliArgs {
    #[arg(long, value_enum, default_value_t = Backend::Cpu, env = "MESHSYNC_BACKEND")]
    pub backend: Backend,

    #[arg(long, default_value_t = 60, env = "MESHSYNC_FRAMES")]
    pub frames: u32,

    #[arg(long, env = "MESHSYNC_SYNC_MESHES", help = "Import mesh updates on the calling thread")]
    pub sync_meshes: bool,

    #[arg(
        long,
        env = "MESHSYNC_NO_ABORT",
        help = "Replace broken meshes by an empty fallback instead of panicking, the default in release builds"
    )]
    pub no_abort: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Cpu,
    Wgpu,
}

/// Switches that change how the subsystem reacts, rather than what it computes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// Configuration errors (broken meshes) panic instead of being replaced by an empty fallback.
    pub abort_on_error: bool,
    /// Mesh updates are imported on the calling thread and replace the asset in place.
    pub update_meshes_synchronously: bool,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            abort_on_error: cfg!(debug_assertions),
            update_meshes_synchronously: false,
        }
    }
}

impl From<&CliArgs> for RuntimeFlags {
    fn from(args: &CliArgs) -> Self {
        Self {
            abort_on_error: cfg!(debug_assertions) && !args.no_abort,
            update_meshes_synchronously: args.sync_meshes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn flags_follow_the_arguments() {
        let args = CliArgs::parse_from(["meshsync", "--backend", "wgpu", "--sync-meshes", "--no-abort"]);
        assert_eq!(args.backend, Backend::Wgpu);
        assert_eq!(args.frames, 60);

        let flags = RuntimeFlags::from(&args);
        assert!(flags.update_meshes_synchronously);
        assert!(!flags.abort_on_error);
    }
}
