use pf_protocol::{Experiment, StepType, compile, load_yaml};
use proptest::prelude::*;

const CYCLE: &str = r#"
period_s: 30.0
cycles: 2
steps:
  - type: Discharge
    current_a: 5.0
    duration_s: 1800
    until_v: 3.2
  - type: Rest
    duration_s: 600
  - type: ChargePower
    power_w: 15.0
    duration_s: 900
    until_v: 4.1
"#;

#[test]
fn yaml_experiment_compiles_end_to_end() {
    let exp = Experiment::from_yaml_str(CYCLE).unwrap();
    let protocol = compile(&exp).unwrap();
    assert_eq!(protocol.segments().len(), 6);
    assert_eq!(protocol.total_steps(), 2 * (60 + 20 + 30));
    assert_eq!(protocol.segments()[2].step_type, StepType::Power);
    assert_eq!(protocol.segments()[2].termination, Some(4.1));
    assert!(protocol.segments()[2].setpoints.iter().all(|&p| p == -15.0));
}

#[test]
fn load_yaml_reads_from_disk() {
    let dir = std::env::temp_dir().join(format!("pf_protocol_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cycle.yaml");
    std::fs::write(&path, CYCLE).unwrap();

    let exp = load_yaml(&path).unwrap();
    assert_eq!(exp.cycles, 2);
    assert_eq!(exp.period_s, 30.0);

    std::fs::remove_dir_all(&dir).ok();
}

proptest! {
    #[test]
    fn setpoint_count_tracks_duration(steps in 1usize..200, period in 0.1f64..60.0, current in 0.0f64..20.0) {
        let exp = Experiment::new(period, vec![pf_protocol::StepDef::Discharge {
            current_a: current,
            duration_s: steps as f64 * period,
            until_v: None,
        }]);
        let protocol = compile(&exp).unwrap();
        prop_assert_eq!(protocol.total_steps(), steps);
        prop_assert!(protocol.flattened().iter().all(|&i| i == current));
    }
}
