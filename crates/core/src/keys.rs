// crates/core/src/keys.rs
//! Key derivation for the persisted layout.
//!
//! Per-class keys are `<class>.<history-kind>` and job records are
//! `<class>.job.<job-id>`. External tooling reads these names directly, so
//! they must not change. Everything sits under an optional namespace joined
//! with `:`.

/// Ordered sets kept per job class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    Running,
    Finished,
    Linear,
}

impl SetKind {
    pub const ALL: [SetKind; 3] = [SetKind::Running, SetKind::Finished, SetKind::Linear];

    pub fn history_kind(self) -> &'static str {
        match self {
            SetKind::Running => "running_jobs",
            SetKind::Finished => "finished_jobs",
            SetKind::Linear => "linear_jobs",
        }
    }
}

impl std::fmt::Display for SetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetKind::Running => write!(f, "running"),
            SetKind::Finished => write!(f, "finished"),
            SetKind::Linear => write!(f, "linear"),
        }
    }
}

impl std::str::FromStr for SetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SetKind::Running),
            "finished" => Ok(SetKind::Finished),
            "linear" => Ok(SetKind::Linear),
            other => Err(format!("unknown job set `{other}`")),
        }
    }
}

/// Per-class counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    MaxRunning,
    TotalFailed,
    TotalFinished,
}

impl Aggregate {
    pub const ALL: [Aggregate; 3] = [
        Aggregate::MaxRunning,
        Aggregate::TotalFailed,
        Aggregate::TotalFinished,
    ];

    pub fn history_kind(self) -> &'static str {
        match self {
            Aggregate::MaxRunning => "max_running_jobs",
            Aggregate::TotalFailed => "total_failed_jobs",
            Aggregate::TotalFinished => "total_finished_jobs",
        }
    }
}

const RECORD_KIND: &str = "job";
const CLASS_LIST: &str = "class_list";
const CUTTING_BLOCK: &str = "cutting_block";
const QUEUE: &str = "queue";

fn is_history_kind(name: &str) -> bool {
    SetKind::ALL.iter().any(|k| name == k.history_kind())
        || Aggregate::ALL.iter().any(|a| name == a.history_kind())
}

/// Whether `rest`, following `<class>.`, is a key that class writes.
fn is_class_suffix(rest: &str) -> bool {
    is_history_kind(rest) || rest.starts_with(&format!("{RECORD_KIND}."))
}

/// Derives every key the ledger touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    namespace: Option<String>,
}

impl KeySpace {
    pub fn new(namespace: Option<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()),
        }
    }

    fn qualify(&self, key: String) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key,
        }
    }

    pub fn set(&self, class_name: &str, kind: SetKind) -> String {
        self.qualify(format!("{class_name}.{}", kind.history_kind()))
    }

    pub fn aggregate(&self, class_name: &str, aggregate: Aggregate) -> String {
        self.qualify(format!("{class_name}.{}", aggregate.history_kind()))
    }

    pub fn job(&self, class_name: &str, job_id: &str) -> String {
        self.qualify(format!("{class_name}.{RECORD_KIND}.{job_id}"))
    }

    /// Prefix shared by every record of a class.
    pub fn job_prefix(&self, class_name: &str) -> String {
        self.qualify(format!("{class_name}.{RECORD_KIND}."))
    }

    /// Recover the job id from a key produced by [`KeySpace::job`].
    pub fn job_id_from_key<'a>(&self, class_name: &str, key: &'a str) -> Option<&'a str> {
        let prefix = self.job_prefix(class_name);
        key.strip_prefix(prefix.as_str()).filter(|id| !id.is_empty())
    }

    /// Job id of a key found by scanning [`KeySpace::job_prefix`].
    ///
    /// Class names may contain dots, so the prefix of `X` also covers keys of
    /// a class `X.job`. A key is skipped when a longer class in `classes`
    /// owns it, or when its id is a per-class set or counter name.
    pub fn scanned_job_id<'a>(
        &self,
        class_name: &str,
        key: &'a str,
        classes: &[String],
    ) -> Option<&'a str> {
        let job_id = self.job_id_from_key(class_name, key)?;
        let shadowed = classes.iter().any(|other| {
            other.len() > class_name.len()
                && key
                    .strip_prefix(self.qualify(format!("{other}.")).as_str())
                    .is_some_and(is_class_suffix)
        });
        (!shadowed && !is_history_kind(job_id)).then_some(job_id)
    }

    pub fn class_list(&self) -> String {
        self.qualify(CLASS_LIST.to_string())
    }

    pub fn cutting_block(&self, hostname: &str) -> String {
        self.qualify(format!("{CUTTING_BLOCK}.{hostname}"))
    }

    pub fn queue(&self, class_name: &str) -> String {
        self.qualify(format!("{QUEUE}.{class_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_without_namespace() {
        let keys = KeySpace::new(None);
        assert_eq!(keys.set("ReportJob", SetKind::Running), "ReportJob.running_jobs");
        assert_eq!(keys.set("ReportJob", SetKind::Linear), "ReportJob.linear_jobs");
        assert_eq!(
            keys.aggregate("ReportJob", Aggregate::TotalFailed),
            "ReportJob.total_failed_jobs"
        );
        assert_eq!(keys.job("ReportJob", "42"), "ReportJob.job.42");
    }

    #[test]
    fn test_layout_with_namespace() {
        let keys = KeySpace::new(Some("job_history".into()));
        assert_eq!(
            keys.aggregate("ReportJob", Aggregate::MaxRunning),
            "job_history:ReportJob.max_running_jobs"
        );
        assert_eq!(keys.cutting_block("worker-1"), "job_history:cutting_block.worker-1");
        assert_eq!(keys.class_list(), "job_history:class_list");
    }

    #[test]
    fn test_empty_namespace_is_none() {
        assert_eq!(KeySpace::new(Some(String::new())), KeySpace::new(None));
    }

    #[test]
    fn test_job_id_from_key() {
        let keys = KeySpace::new(Some("ns".into()));
        let key = keys.job("ReportJob", "abc-1");
        assert_eq!(keys.job_id_from_key("ReportJob", &key), Some("abc-1"));
        assert_eq!(keys.job_id_from_key("Other", &key), None);
        assert_eq!(keys.job_id_from_key("ReportJob", "ns:ReportJob.job."), None);
    }

    #[test]
    fn test_scanned_job_id_skips_longer_class() {
        let keys = KeySpace::new(Some("ns".into()));
        let classes = vec!["Report".to_string(), "Report.job".to_string()];
        let own = keys.job("Report", "7");
        assert_eq!(keys.scanned_job_id("Report", &own, &classes), Some("7"));

        let other_record = keys.job("Report.job", "7");
        assert_eq!(keys.scanned_job_id("Report", &other_record, &classes), None);

        let other_set = keys.set("Report.job", SetKind::Running);
        assert_eq!(keys.scanned_job_id("Report", &other_set, &[]), None);
        let other_counter = keys.aggregate("Report.job", Aggregate::TotalFailed);
        assert_eq!(keys.scanned_job_id("Report", &other_counter, &[]), None);
    }

    #[test]
    fn test_set_kind_parse() {
        assert_eq!("finished".parse::<SetKind>(), Ok(SetKind::Finished));
        assert!("queued".parse::<SetKind>().is_err());
    }
}
