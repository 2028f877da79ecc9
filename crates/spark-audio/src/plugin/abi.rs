//! Entry points a backend plugin library exports
//!
//! A plugin is a `cdylib` exporting exactly two symbols:
//!
//! - `spark_audio_backend_create() -> *mut BackendBox`: build a backend,
//!   null on failure
//! - `spark_audio_backend_release(*mut BackendBox)`: destroy what `create`
//!   returned
//!
//! Both are generated by [`export_audio_backend!`](crate::export_audio_backend),
//! so allocation and deallocation happen inside the plugin. The box carries
//! a Rust trait object: plugins must be built with the same compiler and
//! the same `spark-audio` as the host.

use crate::backend::AudioBackend;

/// Factory symbol name, NUL-terminated
pub const CREATE_SYMBOL: &[u8] = b"spark_audio_backend_create\0";

/// Cleanup symbol name, NUL-terminated
pub const RELEASE_SYMBOL: &[u8] = b"spark_audio_backend_release\0";

/// Backend instance handed across the library boundary
pub struct BackendBox(pub Box<dyn AudioBackend>);

pub type CreateFn = unsafe extern "C" fn() -> *mut BackendBox;
pub type ReleaseFn = unsafe extern "C" fn(*mut BackendBox);

/// Symbol name without the trailing NUL, for messages
pub(crate) fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
}

/// Export a backend from a plugin crate
///
/// ```ignore
/// spark_audio::export_audio_backend!(MyBackend::new());
/// ```
///
/// A panic inside the constructor is caught and reported as a null backend.
#[macro_export]
macro_rules! export_audio_backend {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn spark_audio_backend_create() -> *mut $crate::plugin::BackendBox {
            let built = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                let backend: ::std::boxed::Box<dyn $crate::backend::AudioBackend> =
                    ::std::boxed::Box::new($ctor);
                backend
            }));
            match built {
                Ok(backend) => ::std::boxed::Box::into_raw(::std::boxed::Box::new(
                    $crate::plugin::BackendBox(backend),
                )),
                Err(_) => ::std::ptr::null_mut(),
            }
        }

        /// # Safety
        ///
        /// `backend` must come from `spark_audio_backend_create` of this
        /// library and must not be used afterwards.
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn spark_audio_backend_release(
            backend: *mut $crate::plugin::BackendBox,
        ) {
            if !backend.is_null() {
                drop(::std::boxed::Box::from_raw(backend));
            }
        }
    };
}
