use std::{
    ffi::c_void,
    path::{Path, PathBuf},
};

use libloading::Library;
use ndarray::{ArrayD, IxDyn};

use super::ValidationError;

type CreateFn = unsafe extern "C" fn() -> *mut c_void;
type InitFn = unsafe extern "C" fn(*mut c_void) -> bool;
type RankFn = unsafe extern "C" fn(*mut c_void) -> i32;
type ShapeFn = unsafe extern "C" fn(*mut c_void, *mut i32);
type RunFn = unsafe extern "C" fn(*mut c_void, *const f32, *mut f32);
type DeleteFn = unsafe extern "C" fn(*mut c_void);

/// A network that can be initialized once and then run on batched float tensors.
pub trait InferenceLibrary {
    fn init(&mut self) -> Result<(), ValidationError>;
    fn input_shape(&self) -> Vec<usize>;
    fn output_shape(&self) -> Vec<usize>;
    fn run(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, ValidationError>;
}

/// A generated shared library, opened with `libloading`.
pub struct NnLib {
    path: PathBuf,
    network: *mut c_void,
    init_fn: InitFn,
    input_rank: RankFn,
    output_rank: RankFn,
    input_shape_fn: ShapeFn,
    output_shape_fn: ShapeFn,
    run_fn: RunFn,
    delete_fn: DeleteFn,
    initialized: bool,
    // Must outlive every function pointer above; dropped last.
    _library: Library,
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &'static str) -> Result<T, ValidationError> {
    // SAFETY: the type of each symbol is fixed by the generated runtime's C header.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|source| ValidationError::MissingSymbol {
            path: path.to_path_buf(),
            name,
            source,
        })
}

impl NnLib {
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        // SAFETY: loading runs the library's initializers; the library comes from our own build.
        let library = unsafe { Library::new(path) }.map_err(|source| ValidationError::LibraryLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let create: CreateFn = symbol(&library, path, "network_create")?;
        let init_fn = symbol(&library, path, "network_init")?;
        let input_rank = symbol(&library, path, "network_get_input_rank")?;
        let output_rank = symbol(&library, path, "network_get_output_rank")?;
        let input_shape_fn = symbol(&library, path, "network_get_input_shape")?;
        let output_shape_fn = symbol(&library, path, "network_get_output_shape")?;
        let run_fn = symbol(&library, path, "network_run")?;
        let delete_fn = symbol(&library, path, "network_delete")?;

        // SAFETY: takes no arguments; a null result is handled below.
        let network = unsafe { create() };
        if network.is_null() {
            return Err(ValidationError::NetworkCreate(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            network,
            init_fn,
            input_rank,
            output_rank,
            input_shape_fn,
            output_shape_fn,
            run_fn,
            delete_fn,
            initialized: false,
            _library: library,
        })
    }

    fn shape(&self, rank: RankFn, shape: ShapeFn) -> Vec<usize> {
        // SAFETY: `network` is a live handle from `network_create`.
        let rank = unsafe { rank(self.network) }.max(0) as usize;
        let mut dims = vec![0i32; rank];
        // SAFETY: the callee writes exactly `rank` dimensions.
        unsafe { shape(self.network, dims.as_mut_ptr()) };
        dims.into_iter().map(|d| d.max(0) as usize).collect()
    }
}

impl InferenceLibrary for NnLib {
    fn init(&mut self) -> Result<(), ValidationError> {
        // SAFETY: live handle.
        if !unsafe { (self.init_fn)(self.network) } {
            return Err(ValidationError::NetworkInit(self.path.clone()));
        }
        self.initialized = true;
        Ok(())
    }

    fn input_shape(&self) -> Vec<usize> {
        self.shape(self.input_rank, self.input_shape_fn)
    }

    fn output_shape(&self) -> Vec<usize> {
        self.shape(self.output_rank, self.output_shape_fn)
    }

    fn run(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, ValidationError> {
        if !self.initialized {
            return Err(ValidationError::NetworkInit(self.path.clone()));
        }
        let expected: usize = self.input_shape().iter().product();
        if input.len() != expected {
            return Err(ValidationError::ElementCountMismatch {
                produced: input.len(),
                golden: expected,
            });
        }
        let input = input.as_standard_layout();
        let output_shape = self.output_shape();
        let mut output = ArrayD::<f32>::zeros(IxDyn(&output_shape));

        let (Some(input_ptr), Some(output_ptr)) = (
            input.as_slice().map(<[f32]>::as_ptr),
            output.as_slice_mut().map(<[f32]>::as_mut_ptr),
        ) else {
            return Err(ValidationError::NonContiguous);
        };
        // SAFETY: both buffers are contiguous and sized from the network's own shape queries.
        unsafe { (self.run_fn)(self.network, input_ptr, output_ptr) };
        Ok(output)
    }
}

impl Drop for NnLib {
    fn drop(&mut self) {
        // SAFETY: handle came from `network_create` and is deleted exactly once.
        unsafe { (self.delete_fn)(self.network) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_load_error() {
        let err = NnLib::load(Path::new("/definitely/not/lib_x86_64.so"))
            .err()
            .unwrap();
        assert!(matches!(err, ValidationError::LibraryLoad { .. }));
    }
}
