use std::path::PathBuf;

xflags::xflags! {
    src "./src/cli.rs"

    cmd mkvprobe {
        repeated -v, --verbose

        cmd info {
            required path: PathBuf
        }

        cmd packets {
            required path: PathBuf
            optional --limit limit: usize
        }
    }
}

// generated start
// The following code is generated by `xflags` macro.
// Run `env UPDATE_XFLAGS=1 cargo build` to regenerate.
#[derive(Debug)]
pub struct Mkvprobe {
    pub verbose: u32,
    pub subcommand: MkvprobeCmd,
}

#[derive(Debug)]
pub enum MkvprobeCmd {
    Info(Info),
    Packets(Packets),
}

#[derive(Debug)]
pub struct Info {
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct Packets {
    pub path: PathBuf,
    pub limit: Option<usize>,
}

impl Mkvprobe {
    #[allow(dead_code)]
    pub fn from_env_or_exit() -> Self {
        Self::from_env_or_exit_()
    }

    #[allow(dead_code)]
    pub fn from_env() -> xflags::Result<Self> {
        Self::from_env_()
    }

    #[allow(dead_code)]
    pub fn from_vec(args: Vec<std::ffi::OsString>) -> xflags::Result<Self> {
        Self::from_vec_(args)
    }
}
// generated end
