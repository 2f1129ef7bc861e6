use reqwest::Method;

/// Body of a logical request, kept as owned data so every attempt can rebuild it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded` fields, in order
    Form(Vec<(String, String)>),
    /// Single-file `multipart/form-data` upload
    File {
        field: String,
        file_name: String,
        content: Vec<u8>,
    },
}

/// One logical call against a service role, independent of the endpoint that serves it
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Service path relative to the endpoint root, e.g. `experiments/1/next_simulation`
    pub path: String,
    pub body: RequestBody,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_form<K, V>(path: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Form(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn put_file(
        path: impl Into<String>,
        file_name: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: RequestBody::File {
                field: "file".to_string(),
                file_name: file_name.into(),
                content,
            },
        }
    }
}

/// HTTP basic-auth credentials attached to every call
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}
