//! Remediation checklists keyed by solution text.

/// Known solutions and their step-by-step procedure.
const SOLUTION_STEPS: &[(&str, &[&str])] = &[
    (
        "Belt replacement and realignment",
        &[
            "1. Stop the machine and lock it out",
            "2. Remove the belt access guards",
            "3. Inspect wear and replace damaged belts",
            "4. Check pulley alignment",
            "5. Re-tension the belts to specification",
            "6. Test run without load",
            "7. Check vibration and noise levels",
        ],
    ),
    (
        "Sensor replacement and recalibration",
        &[
            "1. Identify the faulty sensor",
            "2. Cut the electrical supply",
            "3. Disconnect and remove the sensor",
            "4. Install the new sensor",
            "5. Reconnect and check the wiring",
            "6. Recalibrate following the manufacturer procedure",
            "7. Test operation",
        ],
    ),
    (
        "Thermal control system recalibration",
        &[
            "1. Check the temperature set points",
            "2. Clean the temperature probes",
            "3. Recalibrate the probes if needed",
            "4. Check the regulation loop",
            "5. Tune the PID parameters",
            "6. Run a test cycle",
            "7. Confirm thermal stability",
        ],
    ),
    (
        "Tension adjustment and roller cleaning",
        &[
            "1. Stop the line",
            "2. Clean all feed rollers",
            "3. Inspect roller condition",
            "4. Adjust feed tension progressively",
            "5. Test at several speeds",
            "6. Confirm there is no jamming",
            "7. Document the new settings",
        ],
    ),
    (
        "Bearing replacement and balancing",
        &[
            "1. Diagnose the faulty bearings",
            "2. Order the spare parts",
            "3. Dismantle the affected assembly",
            "4. Replace the bearings",
            "5. Perform dynamic balancing",
            "6. Reassemble and align",
            "7. Validate with vibration measurements",
        ],
    ),
];

const GENERIC_STEPS: &[&str] = &[
    "1. Diagnose the problem precisely",
    "2. Lock out the machine",
    "3. Apply the identified solution",
    "4. Verify the result",
    "5. Return to service",
    "6. Document the intervention",
];

/// Steps for the first known solution contained (case-insensitively) in
/// `solution`, or the generic checklist.
pub fn solution_steps(solution: &str) -> Vec<String> {
    let lowered = solution.to_lowercase();
    SOLUTION_STEPS
        .iter()
        .find(|(key, _)| lowered.contains(&key.to_lowercase()))
        .map_or(GENERIC_STEPS, |(_, steps)| *steps)
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let steps = solution_steps("Urgent: BELT REPLACEMENT AND REALIGNMENT on M1-2");
        assert_eq!(steps.len(), 7);
        assert!(steps[0].contains("lock it out"));
    }

    #[test]
    fn test_unknown_solution_gets_generic_checklist() {
        let steps = solution_steps("Replaced the gearbox");
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[5], "6. Document the intervention");
    }
}
