//! Typed API records and the fetch helpers that return them.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	client::{ApiClient, Page},
	http::HttpTransport,
};

/// Lifecycle state of a project, as used in `status` query parameters and payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
	/// Visible, ongoing project.
	#[default]
	Active,
	/// Archived (read-only) project.
	Archived,
	/// Project in the trash.
	Trashed,
}
impl ProjectStatus {
	const WIRE: [(ProjectStatus, &'static str); 3] = [
		(ProjectStatus::Active, "active"),
		(ProjectStatus::Archived, "archived"),
		(ProjectStatus::Trashed, "trashed"),
	];

	/// Returns the wire value of the status.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProjectStatus::Active => Self::WIRE[0].1,
			ProjectStatus::Archived => Self::WIRE[1].1,
			ProjectStatus::Trashed => Self::WIRE[2].1,
		}
	}
}
impl Display for ProjectStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ProjectStatus {
	type Err = UnknownProjectStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::WIRE
			.iter()
			.find(|(_, wire)| wire.eq_ignore_ascii_case(s))
			.map(|(status, _)| *status)
			.ok_or_else(|| UnknownProjectStatus(s.to_owned()))
	}
}

/// Error returned when parsing an unrecognized [`ProjectStatus`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown project status: {0}.")]
pub struct UnknownProjectStatus(pub String);

/// A project (a "Basecamp") on the account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
	/// Project identifier.
	pub id: u64,
	/// Lifecycle state.
	pub status: ProjectStatus,
	/// Display name.
	pub name: String,
	/// Optional description.
	#[serde(default)]
	pub description: Option<String>,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Last update instant.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	/// API URL of the project.
	pub url: Url,
	/// Browser URL of the project.
	pub app_url: Url,
	/// Whether the current user bookmarked the project.
	#[serde(default)]
	pub bookmarked: bool,
}

/// A person visible to the authenticated user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
	/// Person identifier.
	pub id: u64,
	/// Display name.
	pub name: String,
	/// Email address.
	pub email_address: String,
	/// Job title.
	#[serde(default)]
	pub title: Option<String>,
	/// Whether the person administers the account.
	#[serde(default)]
	pub admin: bool,
	/// Whether the person owns the account.
	#[serde(default)]
	pub owner: bool,
	/// IANA time zone name.
	#[serde(default)]
	pub time_zone: Option<String>,
	/// Avatar image URL.
	#[serde(default)]
	pub avatar_url: Option<Url>,
}

impl<C> ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// First page of projects, optionally filtered by status (the server defaults to active).
	pub async fn projects(&self, status: Option<ProjectStatus>) -> Result<Page<Project, C>> {
		let mut uri = self.resolve("projects.json")?;

		if let Some(status) = status {
			uri.query_pairs_mut().append_pair("status", status.as_str());
		}

		self.fetch_page(uri).await
	}

	/// A single project.
	pub async fn project(&self, id: u64) -> Result<Project> {
		self.fetch_resource(&format!("projects/{id}.json")).await
	}

	/// First page of people visible to the authenticated user.
	pub async fn people(&self) -> Result<Page<Person, C>> {
		let uri = self.resolve("people.json")?;

		self.fetch_page(uri).await
	}

	async fn fetch_resource<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let uri = self.resolve(path)?;

		self.fetch_one(uri).await
	}
}
