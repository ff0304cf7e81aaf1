use bitflags::bitflags;

/// Open options for [`crate::Dataset`]
#[derive(Debug, Default)]
pub struct DatasetOptions<'a> {
    pub open_flags: OpenFlags,
    /// Only probe these drivers (by short name), in this order.
    pub allowed_drivers: Option<&'a [&'a str]>,
    /// Block cache capacity; overrides [`crate::config::CACHE_MAX_ENV`].
    pub cache_max_blocks: Option<usize>,
}

bitflags! {
    /// Extended open flags used by [`Dataset::open_ex`](crate::Dataset::open_ex).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open in read-only mode (default).
        const OF_READONLY = 0x00;
        /// Open in update mode.
        const OF_UPDATE = 0x01;
        /// Allow raster drivers to be used.
        const OF_RASTER = 0x02;
        /// Log an error in case of failed open.
        const OF_VERBOSE_ERROR = 0x40;
    }
}

impl Default for OpenFlags {
    fn default() -> OpenFlags {
        OpenFlags::OF_READONLY
    }
}

impl From<Access> for OpenFlags {
    fn from(val: Access) -> OpenFlags {
        match val {
            Access::Update => OpenFlags::OF_UPDATE,
            Access::ReadOnly => OpenFlags::OF_READONLY,
        }
    }
}

/// Access mode of a dataset and all of its bands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    Update,
}

impl OpenFlags {
    pub fn access(&self) -> Access {
        if self.contains(OpenFlags::OF_UPDATE) {
            Access::Update
        } else {
            Access::ReadOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_from_flags() {
        assert_eq!(OpenFlags::default().access(), Access::ReadOnly);
        assert_eq!(
            (OpenFlags::OF_UPDATE | OpenFlags::OF_RASTER).access(),
            Access::Update
        );
        assert_eq!(OpenFlags::from(Access::Update), OpenFlags::OF_UPDATE);
    }
}
