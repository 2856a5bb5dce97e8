//! Slice iteration that runs on rayon when the `parallel` feature is on and
//! falls back to `std::slice::Iter` otherwise.

#[cfg(feature = "parallel")]
pub use rayon::prelude;

#[cfg(not(feature = "parallel"))]
pub mod prelude {
    pub trait ParallelSliceIter<T> {
        fn par_iter(&self) -> std::slice::Iter<'_, T>;
    }

    impl<T> ParallelSliceIter<T> for [T] {
        fn par_iter(&self) -> std::slice::Iter<'_, T> {
            self.iter()
        }
    }
}
