//! Scraping of today's holidays from [kakoysegodnyaprazdnik.ru](https://kakoysegodnyaprazdnik.ru/)

mod parsing;

use crate::prelude::*;
use crate::{http, Result};
use serde::Deserialize;
use std::fmt;

pub(crate) use parsing::parse_holidays;

/// Header line of every message with the list of holidays
pub(crate) const HOLIDAYS_HEADER: &str = "Праздники сегодня:";

/// The source answers with a captcha page to requests that don't look like
/// they come from a browser, so we pretend to be one.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
        image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("Accept-Language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"),
    ("Cache-Control", "max-age=0"),
    ("Cookie", "PHPSESSID=dprtnn5u68ok509641nelges41"),
    ("DNT", "1"),
];

#[derive(Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_holidays_url")]
    pub(crate) url: url::Url,
}

fn default_holidays_url() -> url::Url {
    "https://kakoysegodnyaprazdnik.ru/"
        .parse()
        .expect("BUG: the default holidays URL must be valid")
}

/// Today's holidays as they will be shown to the users
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Holidays {
    Found(Vec<String>),

    /// The page was fetched fine, but there is nothing on it
    NoneToday,

    /// The page couldn't be fetched or parsed, the error was already logged
    Unavailable,
}

impl Holidays {
    /// The full message with the header that is sent to the chats
    pub(crate) fn to_message(&self) -> String {
        format!("{HOLIDAYS_HEADER}\n\n{self}")
    }
}

impl fmt::Display for Holidays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holidays::Found(holidays) => f.write_str(&holidays.join("\n")),
            Holidays::NoneToday => f.write_str("Сегодня нет особых праздников."),
            Holidays::Unavailable => {
                f.write_str("Извините, не удалось получить информацию о праздниках.")
            }
        }
    }
}

#[derive(strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
enum FetchOutcome {
    Found,
    Empty,
    Error,
}

pub(crate) struct HolidaysService {
    http: http::Client,
    url: url::Url,
}

impl HolidaysService {
    pub(crate) fn new(http: http::Client, cfg: Config) -> Self {
        Self { http, url: cfg.url }
    }

    /// Fetches the holidays for today. The errors are logged and replaced
    /// with [`Holidays::Unavailable`], so this never fails.
    #[instrument(skip_all, fields(url = %self.url))]
    pub(crate) async fn fetch(&self) -> Holidays {
        let (holidays, outcome) = match self.try_fetch().await {
            Ok(holidays) if holidays.is_empty() => (Holidays::NoneToday, FetchOutcome::Empty),
            Ok(holidays) => {
                info!(count = holidays.len(), "Fetched holidays");
                (Holidays::Found(holidays), FetchOutcome::Found)
            }
            Err(err) => {
                error!(err = tracing_err(&err), "Failed to fetch holidays");
                (Holidays::Unavailable, FetchOutcome::Error)
            }
        };

        let outcome: &'static str = outcome.into();
        metrics::increment_counter!("holidays_fetch_total", "outcome" => outcome);

        holidays
    }

    pub(crate) async fn try_fetch(&self) -> Result<Vec<String>> {
        let request = BROWSER_HEADERS
            .iter()
            .fold(self.http.get(self.url.clone()), |request, (name, value)| {
                request.header(*name, *value)
            });

        let html = request.read_text().await?;

        parse_holidays(&html)
    }
}

#[cfg(test)]
impl HolidaysService {
    /// Service that always fails to connect to the source
    pub(crate) fn unreachable() -> Self {
        // Nothing listens on the port 1 of the loopback interface,
        // so the connection is refused right away
        let cfg = Config {
            url: "http://127.0.0.1:1/".parse().unwrap(),
        };
        Self::new(http::create_client(), cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single HTTP request with the given status line and HTML body
    async fn serve_once(status: &'static str, body: &'static str) -> url::Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\n\
                Content-Type: text/html; charset=utf-8\r\n\
                Content-Length: {}\r\n\
                Connection: close\r\n\
                \r\n\
                {body}",
                body.len()
            );

            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}/").parse().unwrap()
    }

    async fn fetch_from(status: &'static str, body: &'static str) -> Holidays {
        let cfg = Config {
            url: serve_once(status, body).await,
        };
        HolidaysService::new(http::create_client(), cfg).fetch().await
    }

    #[test]
    fn message_rendering() {
        let found = Holidays::Found(vec!["New Year".to_owned(), "Day Off".to_owned()]);

        expect![[r#"
            Праздники сегодня:

            New Year
            Day Off"#]]
        .assert_eq(&found.to_message());

        expect!["Сегодня нет особых праздников."].assert_eq(&Holidays::NoneToday.to_string());

        expect!["Извините, не удалось получить информацию о праздниках."]
            .assert_eq(&Holidays::Unavailable.to_string());
    }

    #[test_log::test(tokio::test)]
    async fn network_failure_falls_back_to_apology() {
        let holidays = HolidaysService::unreachable().fetch().await;

        assert_eq!(holidays, Holidays::Unavailable);
    }

    #[test_log::test(tokio::test)]
    async fn page_without_holidays() {
        let holidays = fetch_from("200 OK", "<html><body></body></html>").await;

        assert_eq!(holidays, Holidays::NoneToday);
    }

    #[test_log::test(tokio::test)]
    async fn page_with_holidays() {
        let page = r#"
            <html><body>
                <div class="listing_wr">
                    <div class="main">
                        <span class="img_wrapper"><img src="new-year.jpg"></span>
                        <span>New Year</span>
                    </div>
                    <div class="main"><span>Day Off</span></div>
                </div>
            </body></html>
        "#;

        let holidays = fetch_from("200 OK", page).await;

        assert_eq!(
            holidays,
            Holidays::Found(vec!["New Year".to_owned(), "Day Off".to_owned()])
        );
    }

    #[test_log::test(tokio::test)]
    async fn error_status_falls_back_to_apology() {
        let holidays = fetch_from("500 Internal Server Error", "oops").await;

        assert_eq!(holidays, Holidays::Unavailable);
    }

    #[test_log::test(tokio::test)]
    #[ignore]
    async fn manual_sandbox() {
        let cfg = Config {
            url: default_holidays_url(),
        };
        let holidays = HolidaysService::new(http::create_client(), cfg).fetch().await;

        eprintln!("{}", holidays.to_message());
    }
}
