use std::alloc::LayoutError;

impl From<LayoutError> for AllocError {
  fn from(_: LayoutError) -> Self {
    Self::LayoutError
  }
}

/// Errors reported by the fallible construction seams. The raw-pointer
/// entry points (`allocate`, `reallocate`) report failure as a null pointer
/// instead.
#[derive(Debug, PartialEq, Eq)]
pub enum AllocError {
  /// The heap source could not provide more memory.
  Oom,
  /// A reservation layout could not be formed.
  LayoutError,
}
