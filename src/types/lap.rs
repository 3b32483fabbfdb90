//! Per-lap summaries derived from recorded samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::RecordedSample;

/// The last-known state of one lap of a race.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Lap {
    pub lap_number: u16,
    pub lap_time: f32,
    pub finished_at: DateTime<Utc>,
    pub race_position: u8,
    pub race_time: f32,
}

impl Lap {
    fn from_sample(recorded: &RecordedSample) -> Self {
        Self {
            lap_number: recorded.sample.lap_number,
            lap_time: recorded.sample.current_lap,
            finished_at: recorded.created_at,
            race_position: recorded.sample.race_position,
            race_time: recorded.sample.current_race_time,
        }
    }

    /// Keep the latest sample of every lap number.
    ///
    /// Ties on `created_at` go to the sample seen last.
    pub fn collect<'a, I>(samples: I) -> BTreeMap<u16, Lap>
    where
        I: IntoIterator<Item = &'a RecordedSample>,
    {
        let mut laps: BTreeMap<u16, Lap> = BTreeMap::new();
        for recorded in samples {
            let lap = Lap::from_sample(recorded);
            match laps.get(&lap.lap_number) {
                Some(existing) if existing.finished_at > lap.finished_at => {}
                _ => {
                    laps.insert(lap.lap_number, lap);
                }
            }
        }
        laps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TelemetrySample;
    use chrono::Duration;
    use uuid::Uuid;

    fn recorded(lap_number: u16, lap_time: f32, at: DateTime<Utc>) -> RecordedSample {
        let sample = TelemetrySample {
            lap_number,
            current_lap: lap_time,
            current_race_time: lap_time * 2.0,
            race_position: 3,
            ..Default::default()
        };
        RecordedSample::new(sample, Uuid::nil(), at)
    }

    #[test]
    fn keeps_last_sample_per_lap() {
        let t0 = Utc::now();
        let samples = vec![
            recorded(0, 10.0, t0),
            recorded(0, 80.0, t0 + Duration::seconds(80)),
            recorded(1, 5.0, t0 + Duration::seconds(85)),
            recorded(1, 79.0, t0 + Duration::seconds(159)),
        ];

        let laps = Lap::collect(&samples);

        assert_eq!(laps.len(), 2);
        assert_eq!(laps[&0].lap_time, 80.0);
        assert_eq!(laps[&1].lap_time, 79.0);
        assert_eq!(laps[&1].race_time, 158.0);
        assert_eq!(laps[&1].race_position, 3);
    }

    #[test]
    fn out_of_order_samples_do_not_regress() {
        let t0 = Utc::now();
        let samples =
            vec![recorded(2, 60.0, t0 + Duration::seconds(60)), recorded(2, 1.0, t0)];

        let laps = Lap::collect(&samples);

        assert_eq!(laps[&2].lap_time, 60.0);
    }

    #[test]
    fn no_samples_no_laps() {
        let samples: Vec<RecordedSample> = Vec::new();
        assert!(Lap::collect(&samples).is_empty());
    }
}
