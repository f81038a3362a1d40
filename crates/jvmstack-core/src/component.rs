use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Java,
    AppServer,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::Java, Component::AppServer];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::AppServer => "app-server",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "java" | "jdk" => Some(Self::Java),
            "app-server" | "appserver" | "tomcat" => Some(Self::AppServer),
            _ => None,
        }
    }

    /// Directory name prefix shared by install roots and backup slots.
    pub fn dir_prefix(self) -> &'static str {
        match self {
            Self::Java => "jdk-",
            Self::AppServer => "apache-tomcat-",
        }
    }

    /// Short token used for per-component state directories.
    pub fn slot_name(self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::AppServer => "tomcat",
        }
    }

    pub fn home_variable(self) -> &'static str {
        match self {
            Self::Java => "JAVA_HOME",
            Self::AppServer => "CATALINA_HOME",
        }
    }

    pub fn is_service_bearing(self) -> bool {
        matches!(self, Self::AppServer)
    }

    pub fn dir_name(self, version: &str) -> String {
        format!("{}{}", self.dir_prefix(), version)
    }

    /// Extracts the version from a directory name following the
    /// `<prefix><version>` convention.
    pub fn version_from_dir_name(self, name: &str) -> Option<&str> {
        let version = name.strip_prefix(self.dir_prefix())?;
        if version.is_empty() || version.contains('/') || version.contains('\\') {
            return None;
        }
        Some(version)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
