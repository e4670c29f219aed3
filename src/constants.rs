// All date-keyed state is computed against Indian Standard Time regardless
// of where a caller or replica runs. IST has no DST, so a fixed offset is
// sufficient and chrono-tz is not needed.
pub const IST_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub const SPEAKERS_PER_DAY: usize = 2;

// Upper bound on commit/re-read rounds when concurrent callers race the
// daily selection. One conflict means another caller won and the re-read
// should succeed immediately; anything past this cap is treated as storage
// misbehavior rather than contention.
pub const MAX_SELECT_ATTEMPTS: u32 = 4;

pub const DEFAULT_RED_CARD_PENALTY: i64 = 5;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
