//! Playback progress for RAOP

/// Playback progress information
#[derive(Debug, Clone, Copy)]
pub struct PlaybackProgress {
    /// RTP timestamp of track start
    pub start: u32,
    /// RTP timestamp of current position
    pub current: u32,
    /// RTP timestamp of track end
    pub end: u32,
}

impl PlaybackProgress {
    /// Create new progress
    #[must_use]
    pub fn new(start: u32, current: u32, end: u32) -> Self {
        Self {
            start,
            current,
            end,
        }
    }

    /// Create progress for track at given position
    ///
    /// # Arguments
    /// * `base_timestamp` - RTP timestamp at track start
    /// * `position_samples` - Current position in samples
    /// * `duration_samples` - Total duration in samples
    #[must_use]
    pub fn from_samples(base_timestamp: u32, position_samples: u32, duration_samples: u32) -> Self {
        Self {
            start: base_timestamp,
            current: base_timestamp.wrapping_add(position_samples),
            end: base_timestamp.wrapping_add(duration_samples),
        }
    }

    /// Encode as text/parameters body
    #[must_use]
    pub fn encode(&self) -> String {
        format!("progress: {}/{}/{}\r\n", self.start, self.current, self.end)
    }

    /// Get current position in seconds (at 44.1kHz)
    #[must_use]
    pub fn position_secs(&self) -> f64 {
        let samples = self.current.wrapping_sub(self.start);
        f64::from(samples) / 44100.0
    }

    /// Get duration in seconds (at 44.1kHz)
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        let samples = self.end.wrapping_sub(self.start);
        f64::from(samples) / 44100.0
    }

    /// Get progress as percentage (0.0 - 1.0)
    #[must_use]
    pub fn percentage(&self) -> f64 {
        let total = f64::from(self.end.wrapping_sub(self.start));
        if total == 0.0 {
            return 0.0;
        }
        let current = f64::from(self.current.wrapping_sub(self.start));
        (current / total).clamp(0.0, 1.0)
    }

    /// Parse from text/parameters body
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let line = text.lines().find(|l| l.starts_with("progress:"))?;
        let values = line.strip_prefix("progress:")?.trim();
        let parts: Vec<&str> = values.split('/').collect();

        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            start: parts[0].trim().parse().ok()?,
            current: parts[1].trim().parse().ok()?,
            end: parts[2].trim().parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_formats_as_start_current_end() {
        let progress = PlaybackProgress::new(0, 44_100, 441_000);
        assert_eq!(progress.encode(), "progress: 0/44100/441000\r\n");
    }

    #[test]
    fn parse_round_trips_an_encoded_body() {
        let progress = PlaybackProgress::new(1000, 2000, 3000);
        let parsed = PlaybackProgress::parse(&progress.encode()).unwrap();
        assert_eq!(parsed.start, 1000);
        assert_eq!(parsed.current, 2000);
        assert_eq!(parsed.end, 3000);
    }

    #[test]
    fn parse_rejects_malformed_bodies() {
        assert!(PlaybackProgress::parse("progress: 1/2\r\n").is_none());
        assert!(PlaybackProgress::parse("volume: -10.0\r\n").is_none());
    }

    #[test]
    fn percentage_and_position_derive_from_the_rtp_span() {
        let progress = PlaybackProgress::from_samples(1000, 44_100, 88_200);
        assert!((progress.position_secs() - 1.0).abs() < 1e-9);
        assert!((progress.duration_secs() - 2.0).abs() < 1e-9);
        assert!((progress.percentage() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn percentage_is_zero_for_a_zero_length_span() {
        let progress = PlaybackProgress::new(500, 500, 500);
        assert_eq!(progress.percentage(), 0.0);
    }
}
