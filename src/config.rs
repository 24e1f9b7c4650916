use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_mailbox_path")]
    pub mailbox_path: String,
    #[serde(default = "default_assignments_path")]
    pub assignments_path: String,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    /// Seconds between scheduled polls. Administrative default is five minutes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub required_fields: RequiredFields,
    pub rules: Vec<EmailRule>,
}

fn default_mailbox_path() -> String {
    "/var/lib/assignmail/mailbox.json".to_string()
}

fn default_assignments_path() -> String {
    "/var/lib/assignmail/assignments.json".to_string()
}

fn default_ledger_path() -> String {
    "/var/lib/assignmail/ledger.jsonl".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

/// Minimum field sets a create action must have extracted before a record is
/// persisted. Deployment-specific: derive these from whichever columns the
/// downstream assignment schema marks non-nullable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredFields {
    #[serde(default = "default_resource_required")]
    pub resource_assignment: Vec<FieldKind>,
    #[serde(default = "default_sa_required")]
    pub sa_assignment: Vec<FieldKind>,
}

fn default_resource_required() -> Vec<FieldKind> {
    vec![FieldKind::ClientName, FieldKind::RequestedBy]
}

fn default_sa_required() -> Vec<FieldKind> {
    vec![FieldKind::Practice, FieldKind::RequestedBy]
}

impl Default for RequiredFields {
    fn default() -> Self {
        RequiredFields {
            resource_assignment: default_resource_required(),
            sa_assignment: default_sa_required(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRule {
    pub id: String,
    pub name: String,
    pub sender_pattern: SenderPattern,
    /// Case-insensitive substring matched against the subject. Empty matches
    /// every subject.
    pub subject_pattern: String,
    #[serde(default)]
    pub mappings: Vec<KeywordMapping>,
    pub action: ActionType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Sender match: the `ANY` sentinel, or a literal address compared
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SenderPattern {
    Any,
    Address(String),
}

impl SenderPattern {
    pub fn matches(&self, from: &str) -> bool {
        match self {
            SenderPattern::Any => true,
            SenderPattern::Address(addr) => from.eq_ignore_ascii_case(addr),
        }
    }
}

impl From<String> for SenderPattern {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("ANY") {
            SenderPattern::Any
        } else {
            SenderPattern::Address(value)
        }
    }
}

impl From<SenderPattern> for String {
    fn from(value: SenderPattern) -> Self {
        match value {
            SenderPattern::Any => "ANY".to_string(),
            SenderPattern::Address(addr) => addr,
        }
    }
}

/// One keyword-to-field mapping. The extractor scans the message body for
/// `keyword` followed by a separator and captures the rest of the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMapping {
    pub keyword: String,
    pub field: FieldKind,
}

/// Closed set of fields the extractor can populate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    ProjectNumber,
    ClientName,
    RequestedBy,
    SkillsRequired,
    StartDate,
    EndDate,
    Description,
    Priority,
    Region,
    ProjectManager,
    DocumentationLink,
    Notes,
    NotificationUsers,
    Practice,
    SaName,
    RevisionNumber,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::ProjectNumber => "projectNumber",
            FieldKind::ClientName => "clientName",
            FieldKind::RequestedBy => "requestedBy",
            FieldKind::SkillsRequired => "skillsRequired",
            FieldKind::StartDate => "startDate",
            FieldKind::EndDate => "endDate",
            FieldKind::Description => "description",
            FieldKind::Priority => "priority",
            FieldKind::Region => "region",
            FieldKind::ProjectManager => "projectManager",
            FieldKind::DocumentationLink => "documentationLink",
            FieldKind::Notes => "notes",
            FieldKind::NotificationUsers => "notificationUsers",
            FieldKind::Practice => "practice",
            FieldKind::SaName => "saName",
            FieldKind::RevisionNumber => "revisionNumber",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    CreateResourceAssignment,
    CreateSaAssignment,
    RequestSaApproval,
    ConfirmSaApproval,
}

impl ActionType {
    pub fn is_approval(&self) -> bool {
        matches!(
            self,
            ActionType::RequestSaApproval | ActionType::ConfirmSaApproval
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateResourceAssignment => "CreateResourceAssignment",
            ActionType::CreateSaAssignment => "CreateSaAssignment",
            ActionType::RequestSaApproval => "RequestSaApproval",
            ActionType::ConfirmSaApproval => "ConfirmSaApproval",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EmailRule {
    fn mapped_fields(&self) -> Vec<FieldKind> {
        self.mappings.iter().map(|m| m.field).collect()
    }

    /// Configuration problems that make the rule unusable. A rule with
    /// problems fails `--test-config` and is skipped at run time.
    pub fn validate(&self, required: &RequiredFields) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("rule name is empty".to_string());
        }
        let mapped = self.mapped_fields();
        let mut require = |field: FieldKind| {
            if !mapped.contains(&field) {
                problems.push(format!(
                    "action {} needs a keyword mapping for field '{field}'",
                    self.action
                ));
            }
        };
        match self.action {
            ActionType::CreateResourceAssignment => {
                for field in &required.resource_assignment {
                    require(*field);
                }
            }
            ActionType::CreateSaAssignment => {
                for field in &required.sa_assignment {
                    require(*field);
                }
            }
            ActionType::RequestSaApproval => {
                require(FieldKind::Practice);
                require(FieldKind::SaName);
            }
            ActionType::ConfirmSaApproval => {
                require(FieldKind::Practice);
                require(FieldKind::SaName);
                require(FieldKind::RevisionNumber);
            }
        }
        problems
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mailbox_path: default_mailbox_path(),
            assignments_path: default_assignments_path(),
            ledger_path: default_ledger_path(),
            poll_interval_secs: default_poll_interval_secs(),
            required_fields: RequiredFields::default(),
            rules: vec![
                EmailRule {
                    id: "pmo-new-resource-request".to_string(),
                    name: "PMO - New Resource Request".to_string(),
                    sender_pattern: SenderPattern::Address("savant@netsync.com".to_string()),
                    subject_pattern: "PMO - New Resource Request".to_string(),
                    mappings: vec![
                        KeywordMapping {
                            keyword: "Job Number".to_string(),
                            field: FieldKind::ProjectNumber,
                        },
                        KeywordMapping {
                            keyword: "Client".to_string(),
                            field: FieldKind::ClientName,
                        },
                        KeywordMapping {
                            keyword: "Requested By".to_string(),
                            field: FieldKind::RequestedBy,
                        },
                        KeywordMapping {
                            keyword: "Skills".to_string(),
                            field: FieldKind::SkillsRequired,
                        },
                        KeywordMapping {
                            keyword: "Start Date".to_string(),
                            field: FieldKind::StartDate,
                        },
                        KeywordMapping {
                            keyword: "End Date".to_string(),
                            field: FieldKind::EndDate,
                        },
                        KeywordMapping {
                            keyword: "Description".to_string(),
                            field: FieldKind::Description,
                        },
                    ],
                    action: ActionType::CreateResourceAssignment,
                    enabled: true,
                },
                EmailRule {
                    id: "pmo-new-sa-request".to_string(),
                    name: "PMO - New SA Request".to_string(),
                    sender_pattern: SenderPattern::Address("savant@netsync.com".to_string()),
                    subject_pattern: "PMO - New SA Request".to_string(),
                    mappings: vec![
                        KeywordMapping {
                            keyword: "Practice".to_string(),
                            field: FieldKind::Practice,
                        },
                        KeywordMapping {
                            keyword: "SA Name".to_string(),
                            field: FieldKind::SaName,
                        },
                        KeywordMapping {
                            keyword: "Requested By".to_string(),
                            field: FieldKind::RequestedBy,
                        },
                        KeywordMapping {
                            keyword: "Revision".to_string(),
                            field: FieldKind::RevisionNumber,
                        },
                    ],
                    action: ActionType::CreateSaAssignment,
                    enabled: true,
                },
                EmailRule {
                    id: "sa-approval-request".to_string(),
                    name: "SA Assignment Approval Request".to_string(),
                    sender_pattern: SenderPattern::Any,
                    subject_pattern: "SA Assignment Approval Request".to_string(),
                    mappings: vec![
                        KeywordMapping {
                            keyword: "Practice".to_string(),
                            field: FieldKind::Practice,
                        },
                        KeywordMapping {
                            keyword: "SA Name".to_string(),
                            field: FieldKind::SaName,
                        },
                    ],
                    action: ActionType::RequestSaApproval,
                    enabled: true,
                },
                EmailRule {
                    id: "sa-approval-confirm".to_string(),
                    name: "SA Assignment Approved".to_string(),
                    sender_pattern: SenderPattern::Any,
                    subject_pattern: "SA Assignment Approved".to_string(),
                    mappings: vec![
                        KeywordMapping {
                            keyword: "Practice".to_string(),
                            field: FieldKind::Practice,
                        },
                        KeywordMapping {
                            keyword: "SA Name".to_string(),
                            field: FieldKind::SaName,
                        },
                        KeywordMapping {
                            keyword: "Revision".to_string(),
                            field: FieldKind::RevisionNumber,
                        },
                    ],
                    action: ActionType::ConfirmSaApproval,
                    enabled: true,
                },
            ],
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Problems across all rules, paired with the offending rule id.
    pub fn validate(&self) -> Vec<(String, String)> {
        let mut problems = Vec::new();
        for rule in &self.rules {
            for problem in rule.validate(&self.required_fields) {
                problems.push((rule.id.clone(), problem));
            }
        }
        problems
    }
}
