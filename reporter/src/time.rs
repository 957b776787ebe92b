use time::OffsetDateTime;

pub trait TimeSource {
    // Return the current wall-clock time, in the offset records should be stamped with
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Default)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        // The local offset is unavailable on some platforms once threads are running.
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}

#[cfg(test)]
#[derive(Clone)]
pub struct FixedTime {
    pub time: OffsetDateTime,
}

#[cfg(test)]
impl TimeSource for FixedTime {
    fn now(&self) -> OffsetDateTime {
        self.time
    }
}
