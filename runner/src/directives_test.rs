use super::{Memory, ResourceDirectives, Setting, WallTime};
use std::time::Duration;

#[test]
pub fn wall_time_formats() {
    let parse = |input: &str| input.parse::<WallTime>().unwrap().0.as_secs();

    assert_eq!(parse("30"), 30 * 60);
    assert_eq!(parse("30:15"), 30 * 60 + 15);
    assert_eq!(parse("02:30:15"), 2 * 3600 + 30 * 60 + 15);
    assert_eq!(parse("5-00:00:00"), 5 * 24 * 3600);
    assert_eq!(parse("1-12"), 36 * 3600);
    assert_eq!(parse("1-00:30"), 24 * 3600 + 30 * 60);
}

#[test]
pub fn wall_time_rejects_garbage() {
    for input in ["", "five days", "1:2:3:4", "1-2:3:4:5", "-10", "12:xx"] {
        assert!(input.parse::<WallTime>().is_err(), "{input} should not parse");
    }
}

#[test]
pub fn wall_time_display() {
    assert_eq!(WallTime(Duration::from_secs(5 * 24 * 3600)).to_string(), "5-00:00:00");
    assert_eq!(WallTime(Duration::from_secs(3661)).to_string(), "01:01:01");
    assert_eq!(WallTime(Duration::from_secs(0)).to_string(), "00:00:00");
    assert_eq!(
        "1-02:03:04".parse::<WallTime>().unwrap().to_string(),
        "1-02:03:04"
    );
}

#[test]
pub fn memory_units() {
    assert_eq!(
        "50G".parse::<Memory>().unwrap(),
        Memory {
            amount: 50,
            unit: Some('G')
        }
    );
    assert_eq!("512m".parse::<Memory>().unwrap().to_string(), "512M");
    assert_eq!("4000".parse::<Memory>().unwrap().unit, None);
    assert!("50GB".parse::<Memory>().is_err());
    assert!("G".parse::<Memory>().is_err());
    assert!("".parse::<Memory>().is_err());
}

#[test]
pub fn settings_plain_and_toggled() {
    let directives: ResourceDirectives = serde_yaml::from_str(
        r#"
nodes: 1
mem: { value: 50G, enabled: false }
gpus: { value: 2, enabled: true }
time: "5-00:00:00"
"#,
    )
    .unwrap();

    assert_eq!(directives.nodes, Some(Setting::Plain(1)));
    assert!(!directives.mem.as_ref().unwrap().is_enabled());
    assert_eq!(directives.mem.as_ref().unwrap().active(), None);
    assert_eq!(directives.gpus.as_ref().unwrap().active(), Some(&2));
    assert_eq!(directives.time_limit(), Some(Duration::from_secs(5 * 24 * 3600)));
    assert_eq!(directives.partition, None);
}

#[test]
pub fn unknown_directive_rejected() {
    assert!(serde_yaml::from_str::<ResourceDirectives>("cpus_per_task: 4").is_err());
}

#[test]
pub fn disabled_time_is_no_limit() {
    let directives = ResourceDirectives {
        time: Some(Setting::Toggled {
            value: "1-00:00:00".parse().unwrap(),
            enabled: false,
        }),
        ..Default::default()
    };

    assert_eq!(directives.time_limit(), None);
}

#[test]
pub fn lines_keep_order_and_comment_out_disabled() {
    let directives = ResourceDirectives {
        job_name: Some(Setting::Plain("ground-state".to_string())),
        nodes: Some(Setting::Plain(1)),
        ntasks: Some(Setting::Plain(3)),
        time: Some(Setting::Plain("5-00:00:00".parse::<WallTime>().unwrap())),
        mem: Some(Setting::Toggled {
            value: "50G".parse().unwrap(),
            enabled: false,
        }),
        partition: Some(Setting::Plain("long".to_string())),
        gpus: Some(Setting::Toggled {
            value: 1,
            enabled: false,
        }),
    };

    assert_eq!(
        directives.lines(),
        vec![
            "#SBATCH --job-name=ground-state",
            "#SBATCH --nodes=1",
            "#SBATCH --ntasks=3",
            "#SBATCH --time=5-00:00:00",
            "##SBATCH --mem=50G",
            "#SBATCH --partition=long",
            "##SBATCH --gres=gpu:1",
        ]
    );
}

#[test]
pub fn no_directives_no_lines() {
    assert!(ResourceDirectives::default().lines().is_empty());
}

#[test]
pub fn wall_time_overflow_is_rejected() {
    for input in [
        "300000000000000-00:00:00",
        "999999999999999999",
        "1-18446744073709551615",
        "5124095576030432:00:00",
    ] {
        assert!(
            matches!(
                input.parse::<WallTime>(),
                Err(crate::config::ConfigErrors::InvalidWallTime(_))
            ),
            "{input} should not parse"
        );
    }

    assert!(serde_yaml::from_str::<ResourceDirectives>("time: \"999999999999999999\"").is_err());
}

#[test]
pub fn toggled_setting_rejects_unknown_keys() {
    assert!(serde_yaml::from_str::<ResourceDirectives>(
        "gpus: { value: 1, enabled: false, extra: 3 }"
    )
    .is_err());
    assert!(serde_yaml::from_str::<ResourceDirectives>("mem: { value: 50G }").is_err());
}
