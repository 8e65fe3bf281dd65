pub mod playlist;

pub use playlist::{
    ChannelKind, ChannelRecord, PlaylistSource, PlaylistStats, RawEntry, RefreshStatus,
    WatchProgress, NOT_GROUP,
};
