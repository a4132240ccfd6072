use std::fs;
use std::path::Path;

use log::info;

use super::{IrModule, TargetError};

/// Offline output: serialize a finalized module to disk. The file is a
/// self-contained image a later invocation (or another tool) can load
/// and execute or translate further.
pub fn write_module_file(module: &IrModule, path: &Path) -> Result<(), TargetError> {
    let payload = serde_json::to_string_pretty(module)
        .map_err(|e| TargetError(format!("cannot serialize module: {e}")))?;
    fs::write(path, payload)
        .map_err(|e| TargetError(format!("cannot write `{}`: {e}", path.display())))?;
    info!("emitted module image `{}`", path.display());
    Ok(())
}

/// Load a module image produced by [write_module_file].
pub fn load_module_file(path: &Path) -> Result<IrModule, TargetError> {
    let payload = fs::read_to_string(path)
        .map_err(|e| TargetError(format!("cannot read `{}`: {e}", path.display())))?;
    serde_json::from_str(&payload)
        .map_err(|e| TargetError(format!("corrupt module image `{}`: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use crate::target::{BinOp, IrBackend, TargetGenerator};

    use super::{load_module_file, write_module_file};

    #[test]
    fn test_module_image_roundtrip() {
        let mut backend = IrBackend::new("image");
        let int = backend.make_int_type(64, true);
        let ty = backend.make_function_type(&[int], int, false);
        let func = backend.create_function("double", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        let param = backend.param_value(func, 0);
        let doubled = backend.emit_binary(BinOp::Add, int, param.clone(), param);
        backend.emit_ret(Some(doubled));
        backend.finish_function_body(func).unwrap();
        backend.finalize_module().unwrap();

        let dir = std::env::temp_dir().join("quill-emitter-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("double.qlm");
        write_module_file(backend.module(), &path).unwrap();
        let loaded = load_module_file(&path).unwrap();

        assert_eq!(loaded.name, "image");
        assert_eq!(loaded.functions.len(), 1);
        assert_eq!(loaded.functions[0].name, "double");
        std::fs::remove_file(path).ok();
    }
}
