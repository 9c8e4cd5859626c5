//! Query expressions for differential and absolute metric checks.

/// Label joining canary and baseline series.
pub const CONTAINER_LABEL: &str = "container_name";
/// Label matched against workload name patterns.
pub const NAME_LABEL: &str = "name";

/// Canary-minus-baseline expression for one metric of one container.
///
/// The backend joins both sides on the container label, so each result
/// series is the per-container difference.
pub fn diff_query(metric: &str, container: &str, canary: &str, baseline: &str) -> String {
    format!(
        "{} - on ({CONTAINER_LABEL}) {}",
        selector(metric, container, canary),
        selector(metric, container, baseline)
    )
}

/// Canary-only expression for an absolute threshold check.
pub fn threshold_query(metric: &str, container: &str, canary: &str) -> String {
    selector(metric, container, canary)
}

fn selector(metric: &str, container: &str, workload: &str) -> String {
    format!(
        "{metric}{{{CONTAINER_LABEL}=\"{}\",{NAME_LABEL}=~\".*{}.*\"}}",
        escape(container),
        escape(workload)
    )
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_query_joins_on_container() {
        let q = diff_query(
            "container_cpu_system_seconds_total",
            "aggregator",
            "canary",
            "baseline",
        );
        assert_eq!(
            q,
            "container_cpu_system_seconds_total{container_name=\"aggregator\",name=~\".*canary.*\"} \
             - on (container_name) \
             container_cpu_system_seconds_total{container_name=\"aggregator\",name=~\".*baseline.*\"}"
        );
    }

    #[test]
    fn threshold_query_selects_canary_only() {
        assert_eq!(
            threshold_query("errors_total", "app", "api-canary"),
            "errors_total{container_name=\"app\",name=~\".*api-canary.*\"}"
        );
    }

    #[test]
    fn label_values_are_escaped() {
        let q = threshold_query("m", "a\"b", "c");
        assert!(q.contains("container_name=\"a\\\"b\""));
    }
}
