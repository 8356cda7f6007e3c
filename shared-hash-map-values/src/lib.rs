pub mod constants;

pub mod mapped_region;
pub use mapped_region::*;

pub mod view_binding;
pub use view_binding::*;

pub mod value_view;
pub use value_view::*;

pub mod long_value;
pub use long_value::*;

pub mod int_value;
pub use int_value::*;

pub mod double_value;
pub use double_value::*;

pub mod debug_assert_aligned;
pub use debug_assert_aligned::*;
