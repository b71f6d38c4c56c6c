//! End-to-end tests against real log files and metrics tables

#[cfg(test)]
mod integration_tests {
    use crate::{
        args, mask_digits, metrics::CSV_HEADER, CatcherConfig, ErrorCatcher, Table, Tabular,
        Timer, TimerConfig,
    };
    use serde_json::Value;
    use std::collections::HashSet;
    use std::path::Path;
    use tempfile::TempDir;

    /// Split one CSV line, honouring quotes and doubled quotes
    fn parse_csv_line(line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                ('"', _) => in_quotes = !in_quotes,
                (',', false) => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }
        fields.push(field);
        fields
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(parse_csv_line)
            .collect()
    }

    fn read_entries(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn quiet_timer_config(dir: &Path) -> TimerConfig {
        TimerConfig {
            log_to_console: false,
            ..TimerConfig::in_dir(dir)
        }
    }

    struct Frame {
        rows: usize,
    }

    impl Tabular for Frame {
        fn row_count(&self) -> usize {
            self.rows
        }
    }

    #[test]
    fn test_timer_bootstraps_files() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let timer = Timer::new(quiet_timer_config(&log_dir)).unwrap();

        let config = timer.config();
        assert!(config.log_file_path().exists());

        let rows = read_rows(&config.results_file_path());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], CSV_HEADER.map(str::to_string).to_vec());
    }

    #[test]
    fn test_add_writes_row_and_log_entry() {
        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();

        let add = timer.wrap_infallible("add", |(a, b): (i32, i32)| a + b);
        assert_eq!(add((2, 3)), 5);

        let rows = read_rows(&timer.config().results_file_path());
        assert_eq!(rows.len(), 2);

        let row = &rows[1];
        assert_eq!(row.len(), 9);
        assert_eq!(row[2], "add");
        assert!(row[3].parse::<f64>().unwrap() >= 0.0);
        assert_eq!(row[7], "[2, 3]");
        assert!(row[8].starts_with("Function `add` executed in "));

        let entries = read_entries(&timer.config().log_file_path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["level"], "INFO");
        assert_eq!(entries[0]["function"], "add");
        assert_eq!(entries[0]["uuid"], row[1].as_str());
        assert_eq!(entries[0]["message"], row[8].as_str());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resource_columns_present_when_tracked() {
        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();

        let total: u64 = timer.time("sum", args![], || (0..100_000u64).sum());
        assert_eq!(total, 4_999_950_000);

        let row = &read_rows(&timer.config().results_file_path())[1];
        assert!(row[4].parse::<f64>().unwrap() >= 0.0);
        assert!(row[5].parse::<f64>().is_ok());
        assert!(row[6].parse::<f64>().unwrap() > 0.0);
        assert!(row[8].contains("CPU Time:"));
    }

    #[test]
    fn test_untracked_resource_columns_are_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = TimerConfig {
            track_resources: false,
            ..quiet_timer_config(temp_dir.path())
        };
        let timer = Timer::new(config).unwrap();

        timer.time("noop", args![], || ());

        let row = &read_rows(&timer.config().results_file_path())[1];
        assert_eq!(&row[4..7], &["", "", ""]);
    }

    #[test]
    fn test_tabular_argument_summarized() {
        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();
        let frame = Frame { rows: 250_000 };

        let rows = timer.time("clean", args![Table(&frame); inplace = true], || frame.rows);
        assert_eq!(rows, 250_000);

        let row = &read_rows(&timer.config().results_file_path())[1];
        assert_eq!(row[7], "[<DataFrame with 250000 rows>] {inplace=true}");
    }

    #[test]
    fn test_failing_call_adds_no_row() {
        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();

        let divide = timer.wrap("divide", |(a, b): (i64, i64)| {
            if b == 0 {
                Err("division by zero".to_string())
            } else {
                Ok(a / b)
            }
        });

        let error = divide((10, 0)).unwrap_err();
        assert_eq!(error, "division by zero");

        assert_eq!(read_rows(&timer.config().results_file_path()).len(), 1);

        let entries = read_entries(&timer.config().log_file_path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["level"], "ERROR");
        assert_eq!(entries[0]["function"], "divide");
        assert_eq!(entries[0]["uuid"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_concurrent_calls_produce_one_row_each() {
        const THREADS: usize = 8;
        const CALLS: usize = 50;

        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();
        let increment = timer.wrap_infallible("increment", |(n,): (usize,)| n + 1);

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let increment = &increment;
                scope.spawn(move || {
                    for i in 0..CALLS {
                        let n = t * CALLS + i;
                        assert_eq!(increment((n,)), n + 1);
                    }
                });
            }
        });

        let rows = read_rows(&timer.config().results_file_path());
        assert_eq!(rows.len(), 1 + THREADS * CALLS);

        let mut ids = HashSet::new();
        let mut args_seen = HashSet::new();
        for row in &rows[1..] {
            assert_eq!(row.len(), 9);
            assert_eq!(row[2], "increment");
            assert!(row[8].starts_with("Function `increment` executed in "));
            ids.insert(row[1].clone());
            args_seen.insert(row[7].clone());
        }
        assert_eq!(ids.len(), THREADS * CALLS);
        assert_eq!(args_seen.len(), THREADS * CALLS);

        let entries = read_entries(&timer.config().log_file_path());
        assert_eq!(entries.len(), THREADS * CALLS);
    }

    #[test]
    fn test_no_digits_reach_any_sink() {
        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::builder(TimerConfig {
            track_resources: false,
            ..quiet_timer_config(temp_dir.path())
        })
        .sanitizer(mask_digits)
        .build()
        .unwrap();
        let catcher = ErrorCatcher::builder(CatcherConfig {
            log_to_console: false,
            ..CatcherConfig::with_log_file(temp_dir.path().join("error.log"))
        })
        .sanitizer(mask_digits)
        .build()
        .unwrap();

        timer.time("store", args!["4111-1111-1111-1111"; pin = 9876], || ());
        let _: Result<(), String> =
            timer.call("charge", args![], || Err("card 4111 rejected".to_string()));
        let _: Result<(), String> =
            catcher.call("charge", || Err("account 5500 locked".to_string()));

        let row = &read_rows(&timer.config().results_file_path())[1];
        assert_eq!(row[7], "[****-****-****-****] {pin=****}");

        for entry in read_entries(&timer.config().log_file_path())
            .into_iter()
            .chain(read_entries(&temp_dir.path().join("error.log")))
        {
            if entry["level"] == "ERROR" {
                let message = entry["message"].as_str().unwrap();
                assert!(!message.chars().any(|c| c.is_ascii_digit()), "{}", message);
            }
        }

        let error_log = std::fs::read_to_string(temp_dir.path().join("error.log")).unwrap();
        assert!(error_log.contains("account **** locked"));
    }

    #[test]
    fn test_timer_log_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let config = TimerConfig {
            max_bytes: 1024,
            backup_count: 2,
            track_resources: false,
            ..quiet_timer_config(temp_dir.path())
        };
        let timer = Timer::new(config).unwrap();

        for i in 0..100 {
            timer.time("tick", args![i], || ());
        }

        let log_path = timer.config().log_file_path();
        assert!(std::fs::metadata(&log_path).unwrap().len() <= 1024);

        let backup = |index: u32| temp_dir.path().join(format!("timing.log.{}", index));
        assert!(backup(1).exists());
        assert!(backup(2).exists());
        assert!(!backup(3).exists());

        // The metrics table is never rotated
        assert_eq!(read_rows(&timer.config().results_file_path()).len(), 101);
    }

    #[test]
    fn test_existing_table_is_appended_not_rewritten() {
        let temp_dir = TempDir::new().unwrap();

        let first = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();
        first.time("a", args![], || ());
        drop(first);

        let second = Timer::new(quiet_timer_config(temp_dir.path())).unwrap();
        second.time("b", args![], || ());

        let rows = read_rows(&second.config().results_file_path());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][2], "a");
        assert_eq!(rows[2][2], "b");
    }

    #[test]
    fn test_unwritable_log_dir_fails_loudly() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("logs");
        std::fs::write(&blocker, "file in the way").unwrap();

        assert!(Timer::new(quiet_timer_config(&blocker)).is_err());
    }

    #[test]
    fn test_elapsed_monotonic_across_calls() {
        let temp_dir = TempDir::new().unwrap();
        let timer = Timer::new(TimerConfig {
            track_resources: false,
            ..quiet_timer_config(temp_dir.path())
        })
        .unwrap();

        for millis in [1u64, 5, 15] {
            timer.time("sleep", args![millis], || {
                std::thread::sleep(std::time::Duration::from_millis(millis))
            });
        }

        let elapsed: Vec<f64> = read_rows(&timer.config().results_file_path())[1..]
            .iter()
            .map(|row| row[3].parse().unwrap())
            .collect();
        assert!(elapsed[0] >= 0.001);
        assert!(elapsed[1] >= 0.005);
        assert!(elapsed[2] >= 0.015);
    }

    #[test]
    fn test_timers_sharing_a_log_rotate_together() {
        let temp_dir = TempDir::new().unwrap();
        let config = TimerConfig {
            max_bytes: 600,
            track_resources: false,
            ..quiet_timer_config(temp_dir.path())
        };
        let first = Timer::new(config.clone()).unwrap();
        let second = Timer::new(config).unwrap();

        second.time("second_early", args![], || ());
        for i in 0..6 {
            first.time("first", args![i], || ());
        }
        second.time("second_late", args![], || ());

        let log_path = first.config().log_file_path();
        let active = read_entries(&log_path);
        assert_eq!(active.last().unwrap()["function"], "second_late");

        let mut total = 0;
        for index in 1..=5 {
            let backup = temp_dir.path().join(format!("timing.log.{}", index));
            if backup.exists() {
                assert!(std::fs::metadata(&backup).unwrap().len() <= 600);
                total += read_entries(&backup).len();
            }
        }
        assert!(std::fs::metadata(&log_path).unwrap().len() <= 600);
        assert_eq!(total + active.len(), 8);
    }

    #[test]
    fn test_failed_log_rotation_keeps_results() {
        let temp_dir = TempDir::new().unwrap();
        let blocked_backup = temp_dir.path().join("timing.log.1");
        std::fs::create_dir(&blocked_backup).unwrap();
        std::fs::write(blocked_backup.join("keep"), "x").unwrap();

        let timer = Timer::new(TimerConfig {
            max_bytes: 100,
            backup_count: 1,
            track_resources: false,
            ..quiet_timer_config(temp_dir.path())
        })
        .unwrap();

        assert_eq!(timer.time("first", args![], || 1), 1);
        assert_eq!(timer.time("second", args![], || 2), 2);

        // The second entry could not rotate in and was dropped
        let entries = read_entries(&timer.config().log_file_path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["function"], "first");

        let rows = read_rows(&timer.config().results_file_path());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][2], "second");
    }
}
