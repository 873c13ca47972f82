use std::{ffi::OsString, net::IpAddr, path::PathBuf};

use lexopt::{
    Arg::{Long, Short, Value},
    Parser, ValueExt,
};
use log::LevelFilter;

use crate::{
    enums::media::CodecChoice,
    utils::{configuration::Configuration, traits::SanitizeArg},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    pub help: bool,
    pub discover: bool,
    pub screen: bool,
    pub tv: Option<String>,
    pub force_transcode: Option<bool>,
    pub transcode_codec: Option<CodecChoice>,
    pub server_port: Option<u16>,
    pub ip_address: Option<IpAddr>,
    pub config_id: Option<String>,
    pub log_level: Option<LevelFilter>,
    pub files: Vec<PathBuf>,
}

impl Args {
    #[must_use]
    pub fn new() -> Args {
        Args::default()
    }

    pub fn usage() {
        println!(
            r#"
Usage: send2tv [options] [file ...]

Recognized options:
    -h (--help) : print usage
    -d (--discover) : search the network for DLNA renderers and exit
    -t (--tv) string : renderer ip address or description url [last used renderer]
    -s (--screen) : stream the screen instead of files
    -f (--force)[=bool] : always transcode [false]
    -H (--hevc) : transcode to HEVC
       (--h264) : transcode to H.264
       (--codec) string : transcode codec (auto/h264/hevc) [auto]
    -p (--port) u16 : http server port, 0 picks a free port [0]
    -e (--ip_address) string : ip address of the local network interface [auto]
    -c (--config_id) string : config_id []
    -l (--log_level) string : log_level (info/debug) [info]
    -v (--verbose) : same as -l debug

While playing: q = quit, n = next file, f/b = seek forward/back, +N/-N = seek N seconds
"#
        );
    }

    /// parse the process arguments
    pub fn parse() -> Result<Args, lexopt::Error> {
        Self::parse_from(Parser::from_env())
    }

    /// parse an explicit argument list (without the program name)
    pub fn parse_args<I>(args: I) -> Result<Args, lexopt::Error>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        Self::parse_from(Parser::from_args(args))
    }

    fn parse_from(mut argparser: Parser) -> Result<Args, lexopt::Error> {
        let mut args = Args::new();
        while let Some(arg) = argparser.next()? {
            match arg {
                Short('h') | Long("help") => {
                    args.help = true;
                }
                Short('d') | Long("discover") => {
                    args.discover = true;
                }
                Short('s') | Long("screen") => {
                    args.screen = true;
                }
                Short('t') | Long("tv") => {
                    args.tv = Some(argparser.value()?.string()?);
                }
                Short('f') | Long("force") => {
                    args.force_transcode = Some(match argparser.optional_value() {
                        Some(value) => {
                            let text = value.clone().string()?;
                            text.as_str().sanitize_bool().parse().map_err(|_| {
                                lexopt::Error::UnexpectedValue {
                                    option: "force".to_string(),
                                    value,
                                }
                            })?
                        }
                        None => true,
                    });
                }
                Short('H') | Long("hevc") => {
                    args.transcode_codec = Some(CodecChoice::Hevc);
                }
                Long("h264") => {
                    args.transcode_codec = Some(CodecChoice::H264);
                }
                Long("codec") => {
                    let value = argparser.value()?;
                    let text = value.clone().string()?;
                    args.transcode_codec = Some(text.parse().map_err(|()| {
                        lexopt::Error::UnexpectedValue {
                            option: "codec".to_string(),
                            value,
                        }
                    })?);
                }
                Short('p') | Long("port") => {
                    args.server_port = Some(argparser.value()?.parse()?);
                }
                Short('e') | Long("ip_address") => {
                    args.ip_address = Some(argparser.value()?.parse()?);
                }
                Short('c') | Long("config_id") => {
                    args.config_id = Some(argparser.value()?.string()?);
                }
                Short('l') | Long("log_level") => {
                    let value = argparser.value()?;
                    let level = value.clone().string()?;
                    args.log_level = Some(match level.to_uppercase().as_str() {
                        "INFO" => LevelFilter::Info,
                        "DEBUG" => LevelFilter::Debug,
                        _ => {
                            return Err(lexopt::Error::UnexpectedValue {
                                option: "log_level".to_string(),
                                value,
                            });
                        }
                    });
                }
                Short('v') | Long("verbose") => {
                    args.log_level = Some(LevelFilter::Debug);
                }
                Value(file) => {
                    args.files.push(PathBuf::from(file));
                }
                _ => return Err(arg.unexpected()),
            }
        }
        Ok(args)
    }

    /// command line values take precedence over the configuration file for this run
    pub fn apply_to(&self, config: &mut Configuration) {
        if let Some(force) = self.force_transcode {
            config.force_transcode = force;
        }
        if let Some(codec) = self.transcode_codec {
            config.transcode_codec = codec;
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(ip) = self.ip_address {
            config.last_network = Some(ip.to_string());
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(tv) = &self.tv {
            config.last_renderer.clone_from(tv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_and_flags() {
        let args = Args::parse_args([
            "-t",
            "192.168.1.20",
            "--force",
            "-H",
            "a.mkv",
            "b.mp4",
            "-p",
            "8200",
        ])
        .unwrap();
        assert_eq!(args.tv.as_deref(), Some("192.168.1.20"));
        assert_eq!(args.force_transcode, Some(true));
        assert_eq!(args.transcode_codec, Some(CodecChoice::Hevc));
        assert_eq!(args.server_port, Some(8200));
        assert_eq!(
            args.files,
            vec![PathBuf::from("a.mkv"), PathBuf::from("b.mp4")]
        );
    }

    #[test]
    fn force_takes_an_attached_bool() {
        let args = Args::parse_args(["--force=no", "x.avi"]).unwrap();
        assert_eq!(args.force_transcode, Some(false));
        assert_eq!(args.files, vec![PathBuf::from("x.avi")]);
        assert!(Args::parse_args(["--force=maybe"]).is_err());
    }

    #[test]
    fn invalid_values() {
        assert!(Args::parse_args(["-p", "http"]).is_err());
        assert!(Args::parse_args(["-e", "not-an-ip"]).is_err());
        assert!(Args::parse_args(["-l", "trace"]).is_err());
        assert!(Args::parse_args(["--codec", "vp9"]).is_err());
        assert!(Args::parse_args(["--bogus"]).is_err());
    }

    #[test]
    fn overrides_config() {
        let mut config = Configuration::new();
        let args = Args::parse_args(["-v", "-s", "--h264", "-t", "10.0.0.9"]).unwrap();
        assert!(args.screen);
        args.apply_to(&mut config);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.transcode_codec, CodecChoice::H264);
        assert_eq!(config.last_renderer, "10.0.0.9");
        assert!(!config.force_transcode);
    }

    #[test]
    fn only_the_renderer_outlives_the_run() {
        let loaded = Configuration::new();
        let mut config = loaded.clone();
        let args = Args::parse_args([
            "--force",
            "-H",
            "-p",
            "9000",
            "-l",
            "debug",
            "-e",
            "10.0.0.2",
            "-t",
            "10.0.0.9",
            "x.avi",
        ])
        .unwrap();
        args.apply_to(&mut config);
        assert!(config.force_transcode);
        let saved = loaded.with_last_renderer(&config.last_renderer);
        assert_eq!(saved.last_renderer, "10.0.0.9");
        assert_eq!(
            Configuration {
                last_renderer: loaded.last_renderer.clone(),
                ..saved
            },
            loaded
        );
    }
}
