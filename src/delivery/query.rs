//! Delivery API query parameters.
//!
//! Each parameter renders to one `name=value` pair. The rendered pairs are
//! both the request's query string and the cache key parameters, so two reads
//! share an entry only when they send the same query in the same order.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// One query parameter of a delivery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    /// Depth of linked content to include.
    Depth(u32),
    Limit(u32),
    Skip(u32),
    Language(String),
    /// Restrict the returned elements.
    Elements(Vec<String>),
    Order {
        element: String,
        order: SortOrder,
    },
    /// `element` equals `value`. Element paths are `system.*` or `elements.*`.
    Equals {
        element: String,
        value: String,
    },
    In {
        element: String,
        values: Vec<String>,
    },
    Contains {
        element: String,
        value: String,
    },
    /// Any other parameter, sent as given.
    Raw {
        name: String,
        value: String,
    },
}

impl QueryParam {
    pub fn depth(depth: u32) -> Self {
        Self::Depth(depth)
    }

    pub fn language(language: impl Into<String>) -> Self {
        Self::Language(language.into())
    }

    pub fn equals(element: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            element: element.into(),
            value: value.into(),
        }
    }

    pub fn within<I, S>(element: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            element: element.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(element: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Contains {
            element: element.into(),
            value: value.into(),
        }
    }

    pub fn order(element: impl Into<String>, order: SortOrder) -> Self {
        Self::Order {
            element: element.into(),
            order,
        }
    }

    pub fn raw(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Raw {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Query-string name and value, unencoded.
    pub fn pair(&self) -> (String, String) {
        match self {
            QueryParam::Depth(depth) => ("depth".into(), depth.to_string()),
            QueryParam::Limit(limit) => ("limit".into(), limit.to_string()),
            QueryParam::Skip(skip) => ("skip".into(), skip.to_string()),
            QueryParam::Language(language) => ("language".into(), language.clone()),
            QueryParam::Elements(elements) => ("elements".into(), elements.join(",")),
            QueryParam::Order { element, order } => {
                ("order".into(), format!("{element}[{}]", order.as_str()))
            }
            QueryParam::Equals { element, value } => (element.clone(), value.clone()),
            QueryParam::In { element, values } => (format!("{element}[in]"), values.join(",")),
            QueryParam::Contains { element, value } => {
                (format!("{element}[contains]"), value.clone())
            }
            QueryParam::Raw { name, value } => (name.clone(), value.clone()),
        }
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, value) = self.pair();
        write!(f, "{name}={value}")
    }
}

/// Render parameters as cache key segments, preserving order.
pub fn key_params(params: &[QueryParam]) -> Vec<String> {
    params.iter().map(ToString::to_string).collect()
}
