use std::borrow::Borrow;
use std::fmt::{self, Display, Write};
use std::sync::Arc;

/// The identity of one operation invoked with one particular set of arguments.
///
/// A key is the operation id immediately followed by the argument list, where every argument is
/// written in its [`Display`] form and separated by `,`. Calling `fetch_user` with `(1,)` thus
/// yields the key `fetch_user1`.
///
/// Keys compare by that string alone. Arguments whose display forms coincide share a key even
/// when their values differ: `("1,2",)` and `(1, 2)` both serialize to `1,2`. Argument types
/// should therefore have an unambiguous display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Creates the key for calling the operation `id` with `args`.
    pub fn for_operation<A: KeyArgs + ?Sized>(id: &str, args: &A) -> Self {
        let mut builder = Self::builder(id);
        // writing into a `String` cannot fail
        args.write_args(&mut builder).unwrap();
        builder.build()
    }

    /// Creates a [`CacheKeyBuilder`] that starts out with the operation `id`.
    pub fn builder(id: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            key: id.to_owned(),
            args: 0,
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A builder for [`CacheKey`]s.
///
/// Arguments are appended one at a time with [`arg`](Self::arg), which takes care of the `,`
/// separators. The builder also implements [`Write`](std::fmt::Write) so that a single argument
/// can be streamed in several pieces.
pub struct CacheKeyBuilder {
    key: String,
    args: usize,
}

impl CacheKeyBuilder {
    /// Appends the display form of one argument.
    pub fn arg<T: Display + ?Sized>(&mut self, arg: &T) -> fmt::Result {
        if self.args > 0 {
            self.key.push(',');
        }
        self.args += 1;
        write!(self.key, "{arg}")
    }

    /// Finalizes the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        CacheKey(self.key.into())
    }
}

impl fmt::Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.key.write_str(s)
    }
}

/// An argument list that can be serialized into a [`CacheKey`].
///
/// This is implemented for:
/// - `()`, meaning no arguments at all,
/// - tuples of up to six [`Display`] arguments,
/// - slices, arrays and `Vec`s of [`Display`] arguments,
/// - common scalar and string types, each being a single argument.
pub trait KeyArgs {
    /// Writes every argument into the `builder`, in order.
    fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result;
}

impl KeyArgs for () {
    fn write_args(&self, _builder: &mut CacheKeyBuilder) -> fmt::Result {
        Ok(())
    }
}

macro_rules! impl_key_args_tuple {
    ($($name:ident),+) => {
        impl<$($name: Display),+> KeyArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result {
                let ($($name,)+) = self;
                $(builder.arg($name)?;)+
                Ok(())
            }
        }
    };
}

impl_key_args_tuple!(A);
impl_key_args_tuple!(A, B);
impl_key_args_tuple!(A, B, C);
impl_key_args_tuple!(A, B, C, D);
impl_key_args_tuple!(A, B, C, D, E);
impl_key_args_tuple!(A, B, C, D, E, F);

impl<T: Display> KeyArgs for [T] {
    fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result {
        self.iter().try_for_each(|arg| builder.arg(arg))
    }
}

impl<T: Display, const N: usize> KeyArgs for [T; N] {
    fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result {
        self.as_slice().write_args(builder)
    }
}

impl<T: Display> KeyArgs for Vec<T> {
    fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result {
        self.as_slice().write_args(builder)
    }
}

macro_rules! impl_key_args_scalar {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl KeyArgs for $ty {
                fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result {
                    builder.arg(self)
                }
            }
        )+
    };
}

impl_key_args_scalar!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char, String, str,
);

impl KeyArgs for &str {
    fn write_args(&self, builder: &mut CacheKeyBuilder) -> fmt::Result {
        builder.arg(*self)
    }
}
