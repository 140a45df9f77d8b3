use std::collections::BTreeMap;

use log::warn;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// APNs priority, sent in the `apns-priority` header. <https://developer.apple.com/documentation/usernotifications/sending-notification-requests-to-apns>
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display, strum::EnumString)]
pub enum Priority {
    /// Send immediately (default)
    #[default]
    #[strum(to_string = "10", serialize = "high")]
    High,
    /// Send based on power considerations on the device
    #[strum(to_string = "5", serialize = "low")]
    Low,
}

/// Envelope carrying the destination token and protocol headers around a [`Payload`].
#[derive(Debug, Default)]
pub struct Notification {
    /// Destination device token
    pub device_token: String,
    /// Canonical UUID that identifies the notification, `apns-id`
    pub apns_id: Option<String>,
    /// Topic of the remote notification, `apns-topic`
    pub topic: Option<String>,
    /// `apns-priority`
    pub priority: Priority,
    /// UNIX timestamp after which the notification is dropped, `apns-expiration`
    pub expiration: Option<u64>,
    /// JSON body
    pub payload: Payload,
}

impl Notification {
    /// Creates a [`Notification`] bound to one device token.
    pub fn new<T: Into<String>>(device_token: T, payload: Payload) -> Self {
        Self {
            device_token: device_token.into(),
            payload,
            ..Default::default()
        }
    }
}

/// JSON body of a remote notification.
///
/// ```
/// # use pushgate::Payload;
/// let mut payload = Payload::new("hello");
/// payload.badge(1).sound("default").alert_title("greeting");
/// let json = serde_json::to_value(&payload).unwrap();
/// assert_eq!("hello", json["aps"]["alert"]["body"]);
/// assert_eq!("greeting", json["aps"]["alert"]["title"]);
/// ```
#[derive(Debug, Default, Serialize)]
pub struct Payload {
    aps: Aps,
    #[serde(flatten)]
    custom: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize)]
struct Aps {
    #[serde(skip_serializing_if = "AlertContent::is_empty")]
    alert: AlertContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<String>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    content_available: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(rename = "url-args", skip_serializing_if = "Vec::is_empty")]
    url_args: Vec<String>,
}

// Plain text until a dictionary field is set, the dictionary wins from then on.
#[derive(Debug, Default)]
struct AlertContent {
    text: Option<String>,
    dictionary: Option<AlertDictionary>,
}

impl AlertContent {
    fn is_empty(&self) -> bool {
        self.text.is_none() && self.dictionary.is_none()
    }
}

impl Serialize for AlertContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (&self.dictionary, &self.text) {
            (Some(dictionary), _) => dictionary.serialize(serializer),
            (None, Some(text)) => serializer.serialize_str(text),
            (None, None) => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
struct AlertDictionary {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    title_loc_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    launch_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    loc_args: Vec<String>,
}

impl Payload {
    /// Creates a [`Payload`] whose alert is the plain message.
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            aps: Aps {
                alert: AlertContent {
                    text: Some(message.into()),
                    dictionary: None,
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Sets the badge count.
    pub fn badge(&mut self, badge: u32) -> &mut Self {
        self.aps.badge = Some(badge);
        self
    }

    /// Sets the sound name.
    pub fn sound<T: Into<String>>(&mut self, sound: T) -> &mut Self {
        self.aps.sound = Some(sound.into());
        self
    }

    /// Marks the notification for background fetch.
    pub fn content_available(&mut self) -> &mut Self {
        self.aps.content_available = Some(1);
        self
    }

    /// Sets the notification category.
    pub fn category<T: Into<String>>(&mut self, category: T) -> &mut Self {
        self.aps.category = Some(category.into());
        self
    }

    /// Sets the Safari URL arguments.
    pub fn url_args(&mut self, url_args: Vec<String>) -> &mut Self {
        self.aps.url_args = url_args;
        self
    }

    /// Adds a custom field next to `aps`. The key `aps` itself is reserved.
    pub fn custom<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let key = key.into();
        if key == "aps" {
            warn!("custom field aps is reserved, ignored");
        } else {
            self.custom.insert(key, value.into());
        }
        self
    }

    /// Sets the alert title.
    pub fn alert_title<T: Into<String>>(&mut self, title: T) -> &mut Self {
        self.alert_dictionary().title = Some(title.into());
        self
    }

    /// Sets the localization key of the title.
    pub fn alert_title_loc_key<T: Into<String>>(&mut self, key: T) -> &mut Self {
        self.alert_dictionary().title_loc_key = Some(key.into());
        self
    }

    /// Sets the arguments of the title localization key.
    pub fn alert_title_loc_args(&mut self, args: Vec<String>) -> &mut Self {
        self.alert_dictionary().title_loc_args = args;
        self
    }

    /// Sets the alert body.
    pub fn alert_body<T: Into<String>>(&mut self, body: T) -> &mut Self {
        self.alert_dictionary().body = Some(body.into());
        self
    }

    /// Sets the launch image.
    pub fn alert_launch_image<T: Into<String>>(&mut self, image: T) -> &mut Self {
        self.alert_dictionary().launch_image = Some(image.into());
        self
    }

    /// Sets the localization key of the body.
    pub fn alert_loc_key<T: Into<String>>(&mut self, key: T) -> &mut Self {
        self.alert_dictionary().loc_key = Some(key.into());
        self
    }

    /// Sets the arguments of the body localization key.
    pub fn alert_loc_args(&mut self, args: Vec<String>) -> &mut Self {
        self.alert_dictionary().loc_args = args;
        self
    }

    /// Sets the action button label.
    pub fn alert_action<T: Into<String>>(&mut self, action: T) -> &mut Self {
        self.alert_dictionary().action = Some(action.into());
        self
    }

    /// Sets the localization key of the action button label.
    pub fn alert_action_loc_key<T: Into<String>>(&mut self, key: T) -> &mut Self {
        self.alert_dictionary().action_loc_key = Some(key.into());
        self
    }

    // The plain message turns into the dictionary body on first use.
    fn alert_dictionary(&mut self) -> &mut AlertDictionary {
        let text = &mut self.aps.alert.text;
        self.aps
            .alert
            .dictionary
            .get_or_insert_with(|| AlertDictionary {
                body: text.take(),
                ..Default::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr as _;

    use serde_json::json;

    #[test]
    fn t_plain_message() -> Result<(), serde_json::Error> {
        let payload = Payload::new("hello");
        assert_eq!(json!({"aps": {"alert": "hello"}}), serde_json::to_value(&payload)?);
        Ok(())
    }

    #[test]
    fn t_body_only() -> Result<(), serde_json::Error> {
        let mut payload = Payload::new("hello");
        payload.alert_body("body");
        assert_eq!(
            json!({"aps": {"alert": {"body": "body"}}}),
            serde_json::to_value(&payload)?
        );
        Ok(())
    }

    #[test]
    fn t_title_keeps_message_as_body() -> Result<(), serde_json::Error> {
        let mut payload = Payload::new("hello");
        payload.alert_title("title");
        assert_eq!(
            json!({"aps": {"alert": {"title": "title", "body": "hello"}}}),
            serde_json::to_value(&payload)?
        );
        Ok(())
    }

    #[test]
    fn t_alert_turns_into_dictionary_once() -> Result<(), serde_json::Error> {
        let mut payload = Payload::default();
        assert_eq!(json!({"aps": {}}), serde_json::to_value(&payload)?);

        payload.alert_title("title");
        assert_eq!(
            json!({"aps": {"alert": {"title": "title"}}}),
            serde_json::to_value(&payload)?
        );

        let mut payload = Payload::new("hello");
        payload.alert_title("title").alert_loc_key("B").alert_title("again");
        assert_eq!(
            json!({"aps": {"alert": {"title": "again", "body": "hello", "loc-key": "B"}}}),
            serde_json::to_value(&payload)?
        );
        Ok(())
    }

    #[test]
    fn t_full() -> Result<(), serde_json::Error> {
        let mut payload = Payload::new("hello");
        payload
            .badge(2)
            .sound("default")
            .content_available()
            .category("MESSAGE")
            .url_args(vec!["a".into()])
            .custom("key", "value")
            .alert_title_loc_key("T")
            .alert_title_loc_args(vec!["t".into()])
            .alert_launch_image("launch.png")
            .alert_loc_key("B")
            .alert_loc_args(vec!["b".into()])
            .alert_action("open")
            .alert_action_loc_key("OPEN");
        assert_eq!(
            json!({
                "aps": {
                    "alert": {
                        "body": "hello",
                        "title-loc-key": "T",
                        "title-loc-args": ["t"],
                        "action": "open",
                        "action-loc-key": "OPEN",
                        "launch-image": "launch.png",
                        "loc-key": "B",
                        "loc-args": ["b"]
                    },
                    "badge": 2,
                    "sound": "default",
                    "content-available": 1,
                    "category": "MESSAGE",
                    "url-args": ["a"]
                },
                "key": "value"
            }),
            serde_json::to_value(&payload)?
        );
        Ok(())
    }

    #[test]
    fn t_reserved_custom_key() -> Result<(), serde_json::Error> {
        let mut payload = Payload::new("hello");
        payload.custom("aps", "overwrite");
        assert_eq!(json!({"aps": {"alert": "hello"}}), serde_json::to_value(&payload)?);
        Ok(())
    }

    #[test]
    fn t_priority() -> Result<(), strum::ParseError> {
        assert_eq!(Priority::High, Priority::default());
        assert_eq!("10", Priority::High.to_string());
        assert_eq!(Priority::High, Priority::from_str("10")?);
        assert_eq!(Priority::High, Priority::from_str("high")?);
        assert_eq!("5", Priority::Low.to_string());
        assert_eq!(Priority::Low, Priority::from_str("5")?);
        assert_eq!(Priority::Low, Priority::from_str("low")?);
        Ok(())
    }
}
