use core::{fmt::Display, time::Duration};
use hashbrown::HashMap;

/// Accumulated device time per kernel entry point.
#[derive(Debug, Default)]
pub struct Profiled {
    durations: HashMap<String, ProfileItem>,
}

#[derive(Debug, Default, Clone)]
struct ProfileItem {
    total_duration: Duration,
    num_computed: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Control the amount of info being display when profiling.
pub enum ProfileLevel {
    /// Provide only the summary information about kernels being run.
    Basic,
    /// Log every kernel as it runs, along with the summary.
    Full,
}

impl Profiled {
    /// If some computation was profiled.
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Add a run of `name` that took `duration`.
    pub fn update(&mut self, name: &str, duration: Duration) {
        let name = name.lines().next().unwrap_or(name);

        match self.durations.get_mut(name) {
            Some(item) => {
                item.total_duration += duration;
                item.num_computed += 1;
            }
            None => {
                self.durations.insert(
                    name.to_string(),
                    ProfileItem {
                        total_duration: duration,
                        num_computed: 1,
                    },
                );
            }
        }
    }

    /// Total time and number of runs recorded for `name`.
    pub fn get(&self, name: &str) -> Option<(Duration, usize)> {
        self.durations
            .get(name)
            .map(|item| (item.total_duration, item.num_computed))
    }
}

impl Display for Profiled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let header_name = "Name";
        let header_num_computed = "Num Computed";
        let header_duration = "Duration";
        let header_ratio = "Ratio";

        let mut name_len = header_name.len();
        let mut num_computed_len = header_num_computed.len();
        let mut duration_len = header_duration.len();
        let mut ratio_len = header_ratio.len();

        let mut total_duration = Duration::ZERO;
        let mut total_computed = 0;

        let mut items: Vec<(String, String, String, Duration)> = self
            .durations
            .iter()
            .map(|(key, item)| {
                let num_computed = format!("{}", item.num_computed);
                let duration = format!("{:?}", item.total_duration);

                name_len = usize::max(name_len, key.len());
                num_computed_len = usize::max(num_computed_len, num_computed.len());
                duration_len = usize::max(duration_len, duration.len());

                total_duration += item.total_duration;
                total_computed += item.num_computed;

                (key.clone(), num_computed, duration, item.total_duration)
            })
            .collect();

        let total_duration_fmt = format!("{total_duration:?}");
        let total_computed_fmt = format!("{total_computed}");
        let total_ratio_fmt = "100 %";

        duration_len = usize::max(duration_len, total_duration_fmt.len());
        num_computed_len = usize::max(num_computed_len, total_computed_fmt.len());
        ratio_len = usize::max(ratio_len, total_ratio_fmt.len());

        let line_length = name_len + duration_len + num_computed_len + ratio_len + 11;
        let write_line = |char: &str, f: &mut core::fmt::Formatter<'_>| {
            writeln!(f, "|{}|", char.repeat(line_length))
        };

        items.sort_by(|(_, _, _, a), (_, _, _, b)| b.cmp(a));

        write_line("-", f)?;
        writeln!(
            f,
            "| {header_name:<name_len$} | {header_duration:<duration_len$} | {header_num_computed:<num_computed_len$} | {header_ratio:<ratio_len$} |",
        )?;
        write_line("-", f)?;

        for (name, num_computed, duration, num) in items {
            let ratio = match total_duration.as_nanos() {
                0 => 0,
                total => (100 * num.as_nanos()) / total,
            };
            let ratio = format!("{ratio} %");

            writeln!(
                f,
                "| {name:<name_len$} | {duration:<duration_len$} | {num_computed:<num_computed_len$} | {ratio:<ratio_len$} |",
            )?;
        }

        write_line("-", f)?;
        writeln!(
            f,
            "| {:<name_len$} | {total_duration_fmt:<duration_len$} | {total_computed_fmt:<num_computed_len$} | {total_ratio_fmt:<ratio_len$} |",
            "Total",
        )?;
        write_line("-", f)
    }
}
