//! Standard host modules: `os`, `sys` and `pathlib`

use std::path::{PathBuf, MAIN_SEPARATOR_STR};
use std::rc::Rc;

use bridge::{register_module, BridgeCache, BridgeResult, Bridged, HostResult, TypeBuilder};
use interpreter::Vm;

/// Version reported as `sys.version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Register every standard host module on `vm`
pub fn register(vm: &mut Vm) {
    register_module(vm, "os", |m| {
        m.doc("Process environment.");
        m.function("getcwd() -> str\nCurrent working directory.", || -> HostResult<String> {
            Ok(std::env::current_dir()?.to_string_lossy().into_owned())
        })?;
        m.function("chdir(path: str) -> None\nChange the working directory.", |path: String| -> HostResult<()> {
            std::env::set_current_dir(path)?;
            Ok(())
        })?;
        m.value("sep", MAIN_SEPARATOR_STR)?;
        Ok(())
    });

    register_module(vm, "sys", |m| {
        m.doc("Interpreter information.");
        m.value("platform", std::env::consts::OS)?;
        m.value("version", VERSION)?;
        Ok(())
    });

    register_module(vm, "pathlib", |m| {
        m.doc("Filesystem paths.");
        m.class::<Path>()?;
        Ok(())
    });
}

/// Filesystem path bridged as `pathlib.Path`
#[derive(Debug)]
pub struct Path {
    cache: BridgeCache,
    path: PathBuf,
}

impl Path {
    /// Wrap `path`
    pub fn new(path: impl Into<PathBuf>) -> Rc<Self> {
        Rc::new(Self {
            cache: BridgeCache::new(),
            path: path.into(),
        })
    }

    /// The wrapped path
    pub fn as_path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Bridged for Path {
    const TYPE_NAME: &'static str = "Path";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.doc("A filesystem path.").module("pathlib");
        ty.constructor("Path(path: str = '.')", |path: String| -> HostResult<Rc<Path>> { Ok(Path::new(path)) })?;
        ty.property("path -> str", |p: &Path| -> HostResult<String> {
            Ok(p.path.to_string_lossy().into_owned())
        })?;
        ty.property("name -> str\nFinal component, empty when there is none.", |p: &Path| -> HostResult<String> {
            Ok(p
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default())
        })?;
        ty.method("exists(self) -> bool", |p: &Path| -> HostResult<bool> { Ok(p.path.exists()) })?;
        ty.method("is_dir(self) -> bool", |p: &Path| -> HostResult<bool> { Ok(p.path.is_dir()) })?;
        ty.method("joinpath(self, part: str) -> Path", |p: &Path, part: String| -> HostResult<Rc<Path>> {
            Ok(Path::new(p.path.join(part)))
        })?;
        ty.method("read_text(self) -> str", |p: &Path| -> HostResult<String> {
            Ok(std::fs::read_to_string(&p.path)?)
        })?;
        ty.method("write_text(self, text: str) -> int", |p: &Path, text: String| -> HostResult<usize> {
            std::fs::write(&p.path, &text)?;
            Ok(text.len())
        })?;
        ty.method("__str__(self) -> str", |p: &Path| -> HostResult<String> {
            Ok(p.path.to_string_lossy().into_owned())
        })?;
        ty.method("__repr__(self) -> str", |p: &Path| -> HostResult<String> {
            Ok(format!("Path('{}')", p.path.display()))
        })?;
        ty.static_method("cwd() -> Path\nCurrent working directory.", || -> HostResult<Rc<Path>> {
            Ok(Path::new(std::env::current_dir()?))
        })?;
        Ok(())
    }
}
