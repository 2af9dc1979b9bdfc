//! Project: the registry entry that ties a display name to its channels.
//!
//! Facts never reference a project directly; they carry the channel's own
//! identifier. A project claims facts by holding that identifier.

use serde::{Deserialize, Serialize};

use crate::fact::Channel;

/// The external identifiers a project is attached to, one per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIds {
  #[serde(default)]
  pub vk_cabinet_id:        Option<String>,
  #[serde(default)]
  pub yandex_cabinet_id:    Option<String>,
  #[serde(default)]
  pub mytracker_project_id: Option<String>,
}

impl ChannelIds {
  pub fn get(&self, channel: Channel) -> Option<&str> {
    let id = match channel {
      Channel::Vk => &self.vk_cabinet_id,
      Channel::Yandex => &self.yandex_cabinet_id,
      Channel::MyTracker => &self.mytracker_project_id,
    };
    id.as_deref().filter(|s| !s.is_empty())
  }

  /// Every configured `(channel, id)` pair.
  pub fn iter(&self) -> impl Iterator<Item = (Channel, &str)> + '_ {
    Channel::ALL
      .into_iter()
      .filter_map(|c| self.get(c).map(|id| (c, id)))
  }
}

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
  pub project_id: i64,
  /// Unique display label.
  pub name:       String,
  #[serde(flatten)]
  pub channels:   ChannelIds,
  /// Inactive projects are left out of digests and channel lookups.
  pub is_active:  bool,
}

/// Input to [`crate::store::MetricsStore::add_project`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
  pub name:     String,
  #[serde(flatten)]
  pub channels: ChannelIds,
}

impl NewProject {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), channels: ChannelIds::default() }
  }

  pub fn with_channel(mut self, channel: Channel, id: impl Into<String>) -> Self {
    let id = Some(id.into());
    match channel {
      Channel::Vk => self.channels.vk_cabinet_id = id,
      Channel::Yandex => self.channels.yandex_cabinet_id = id,
      Channel::MyTracker => self.channels.mytracker_project_id = id,
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_identifiers_count_as_unset() {
    let ids = ChannelIds {
      vk_cabinet_id: Some(String::new()),
      yandex_cabinet_id: Some("ya-1".into()),
      mytracker_project_id: None,
    };
    assert_eq!(ids.get(Channel::Vk), None);
    let pairs: Vec<_> = ids.iter().collect();
    assert_eq!(pairs, vec![(Channel::Yandex, "ya-1")]);
  }

  #[test]
  fn project_serialises_flat() {
    let project = Project {
      project_id: 1,
      name:       "Acme".into(),
      channels:   NewProject::new("Acme")
        .with_channel(Channel::Vk, "cab1")
        .channels,
      is_active:  true,
    };
    let json = serde_json::to_value(&project).unwrap();
    assert_eq!(json["vk_cabinet_id"], "cab1");
    assert!(json["yandex_cabinet_id"].is_null());
    assert_eq!(json["is_active"], true);
  }
}
