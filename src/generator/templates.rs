//! Sample event templates for the built-in vendor generators
//! Each template draws every variable part from the caller's seeded RNG

use crate::models::SampleEvent;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::json;
use uuid::{Builder, Uuid};

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

fn private_ip(rng: &mut StdRng) -> String {
    format!("10.{}.{}.{}", rng.gen_range(0..255), rng.gen_range(0..255), rng.gen_range(1..255))
}

fn public_ip(rng: &mut StdRng) -> String {
    format!(
        "{}.{}.{}.{}",
        pick(rng, &[52, 104, 185, 203]),
        rng.gen_range(0..255),
        rng.gen_range(0..255),
        rng.gen_range(1..255)
    )
}

fn jitter(rng: &mut StdRng, base: DateTime<Utc>) -> DateTime<Utc> {
    base - Duration::seconds(rng.gen_range(0..300))
}

/// Random v4 uuid drawn from the seeded RNG
fn event_uuid(rng: &mut StdRng) -> Uuid {
    Builder::from_random_bytes(rng.gen()).into_uuid()
}

fn user(rng: &mut StdRng) -> &'static str {
    *pick(rng, &["alice", "bob", "carol", "dave", "svc_backup"])
}

/// FortiGate traffic log: syslog header followed by key=value pairs
pub fn fortigate_traffic(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let action = pick(rng, &["accept", "deny", "close"]);
    let dst_port = pick(rng, &[80, 443, 22, 53, 3389]);
    SampleEvent::text(format!(
        "<189>date={} time={} devname=\"FGT60F\" devid=\"FGT60FTK2109\" logid=\"0000000013\" \
         type=\"traffic\" subtype=\"forward\" level=\"notice\" srcip={} srcport={} srcintf=\"port1\" \
         dstip={} dstport={} dstintf=\"wan1\" proto=6 action=\"{}\" policyid={} \
         sentbyte={} rcvdbyte={} user=\"{}\"",
        ts.format("%Y-%m-%d"),
        ts.format("%H:%M:%S"),
        private_ip(rng),
        rng.gen_range(1024..65535),
        public_ip(rng),
        dst_port,
        action,
        rng.gen_range(1..200),
        rng.gen_range(64..1_048_576),
        rng.gen_range(64..1_048_576),
        user(rng)
    ))
}

/// Cisco ASA connection teardown message
pub fn cisco_asa(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    SampleEvent::text(format!(
        "<166>{} asa-fw01 : %ASA-6-302014: Teardown TCP connection {} for outside:{}/{} to inside:{}/{} duration 0:00:{:02} bytes {} TCP FINs",
        ts.format("%b %d %H:%M:%S"),
        rng.gen_range(100_000..999_999),
        public_ip(rng),
        rng.gen_range(1024..65535),
        private_ip(rng),
        pick(rng, &[443, 22, 8080]),
        rng.gen_range(0..60),
        rng.gen_range(100..100_000)
    ))
}

/// Sophos WAF request log as JSON
pub fn sophos_waf(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let blocked = rng.gen_bool(0.4);
    let host = pick(rng, &["shop.example.com", "api.example.com", "portal.example.org"]);
    let path = pick(rng, &["/login", "/api/v1/orders", "/search?q=test", "/admin"]);
    SampleEvent::structured(json!({
        "timestamp": ts.to_rfc3339(),
        "vendor": "Sophos",
        "product": "UTM WAF",
        "srcip": public_ip(rng),
        "dstip": private_ip(rng),
        "host": host,
        "method": pick(rng, &["GET", "POST", "PUT"]),
        "url": format!("https://{}{}", host, path),
        "status": if blocked { 403 } else { *pick(rng, &[200, 301, 404]) },
        "action": if blocked { "block" } else { "allow" },
        "reason": if blocked { pick(rng, &["SQL Injection", "XSS", "Path Traversal"]).to_string() } else { String::new() },
        "user_agent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        "size": rng.gen_range(200..50_000)
    }))
}

/// F5 ASM violation in CEF
pub fn f5_asm(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let (signature, name) = *pick(
        rng,
        &[
            ("200002835", "SQL-INJ expressions like \"or 1=1\""),
            ("200001475", "XSS script tag"),
            ("200010093", "Directory traversal"),
        ],
    );
    SampleEvent::text(format!(
        "CEF:0|F5|ASM|16.1.0|{}|{}|{}|rt={} src={} spt={} dst={} dpt=443 request=/index.php act={} \
         cs1=/Common/waf_policy cs1Label=policy_name suser={}",
        signature,
        name,
        pick(rng, &[5, 7, 8]),
        ts.timestamp_millis(),
        public_ip(rng),
        rng.gen_range(1024..65535),
        private_ip(rng),
        pick(rng, &["blocked", "alerted"]),
        user(rng)
    ))
}

/// AWS CloudTrail management event
pub fn aws_cloudtrail(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let (source, event) = *pick(
        rng,
        &[
            ("iam.amazonaws.com", "CreateAccessKey"),
            ("s3.amazonaws.com", "PutBucketPolicy"),
            ("signin.amazonaws.com", "ConsoleLogin"),
            ("ec2.amazonaws.com", "RunInstances"),
        ],
    );
    let account = format!("{:012}", rng.gen_range(100_000_000_000u64..999_999_999_999));
    let name = user(rng);
    SampleEvent::structured(json!({
        "eventVersion": "1.08",
        "eventTime": ts.to_rfc3339(),
        "eventSource": source,
        "eventName": event,
        "awsRegion": pick(rng, &["us-east-1", "eu-west-1", "ap-southeast-2"]),
        "sourceIPAddress": public_ip(rng),
        "userAgent": "aws-cli/2.13.0",
        "userIdentity": {
            "type": "IAMUser",
            "principalId": format!("AIDA{:016X}", rng.gen::<u64>()),
            "arn": format!("arn:aws:iam::{}:user/{}", account, name),
            "accountId": account,
            "userName": name
        },
        "requestID": event_uuid(rng).to_string(),
        "eventID": event_uuid(rng).to_string(),
        "readOnly": false,
        "eventType": "AwsApiCall",
        "recipientAccountId": account
    }))
}

/// Okta System Log authentication event
pub fn okta_system_log(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let name = user(rng);
    let success = rng.gen_bool(0.7);
    SampleEvent::structured(json!({
        "uuid": event_uuid(rng).to_string(),
        "published": ts.to_rfc3339(),
        "eventType": "user.session.start",
        "severity": if success { "INFO" } else { "WARN" },
        "displayMessage": "User login to Okta",
        "actor": {
            "id": format!("00u{:017x}", rng.gen::<u64>()),
            "type": "User",
            "alternateId": format!("{}@example.com", name),
            "displayName": name
        },
        "client": {
            "ipAddress": public_ip(rng),
            "userAgent": { "browser": "CHROME", "os": "Mac OS X" },
            "geographicalContext": { "country": "United States", "city": "Denver" }
        },
        "outcome": {
            "result": if success { "SUCCESS" } else { "FAILURE" },
            "reason": if success { None } else { Some("INVALID_CREDENTIALS") }
        },
        "authenticationContext": { "authenticationStep": 0, "externalSessionId": format!("{:x}", rng.gen::<u64>()) }
    }))
}

/// Zeek conn.log record as JSON
pub fn zeek_conn(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let proto = *pick(rng, &["tcp", "udp"]);
    SampleEvent::structured(json!({
        "ts": ts.timestamp() as f64 + rng.gen_range(0.0..1.0),
        "uid": format!("C{:017x}", rng.gen::<u64>()),
        "id.orig_h": private_ip(rng),
        "id.orig_p": rng.gen_range(1024..65535),
        "id.resp_h": public_ip(rng),
        "id.resp_p": if proto == "udp" { 53 } else { *pick(rng, &[80, 443, 8443]) },
        "proto": proto,
        "service": if proto == "udp" { "dns" } else { "ssl" },
        "duration": rng.gen_range(0.001..30.0),
        "orig_bytes": rng.gen_range(0..10_000),
        "resp_bytes": rng.gen_range(0..100_000),
        "conn_state": pick(rng, &["SF", "S0", "REJ", "RSTO"]),
        "local_orig": true,
        "missed_bytes": 0,
        "history": "ShADadFf",
        "orig_l2_addr": format!("00:50:56:{:02x}:{:02x}:{:02x}", rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>())
    }))
}

/// Palo Alto traffic log, comma separated
pub fn paloalto_traffic(rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
    let ts = jitter(rng, base);
    let stamp = ts.format("%Y/%m/%d %H:%M:%S").to_string();
    SampleEvent::text(format!(
        "1,{stamp},0123456789,TRAFFIC,end,2561,{stamp},{},{},0.0.0.0,0.0.0.0,allow-web,{},,{},vsys1,trust,untrust,ethernet1/2,ethernet1/1,default,{stamp},{},1,{},{},0,0,0x400000,tcp,{},{},{}",
        private_ip(rng),
        public_ip(rng),
        format!("example\\{}", user(rng)),
        pick(rng, &["ssl", "web-browsing", "dns"]),
        rng.gen_range(10_000..99_999),
        rng.gen_range(1024..65535),
        pick(rng, &[443, 80, 53]),
        pick(rng, &["allow", "deny", "drop"]),
        rng.gen_range(100..100_000),
        rng.gen_range(100..100_000),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::parse_text_event;
    use crate::models::SampleFormat;
    use rand::SeedableRng;

    #[test]
    fn test_text_templates_parse_to_expected_format() {
        let base = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);

        let cases = [
            (fortigate_traffic(&mut rng, base), SampleFormat::KeyValue),
            (f5_asm(&mut rng, base), SampleFormat::Cef),
            (paloalto_traffic(&mut rng, base), SampleFormat::Delimited),
        ];
        for (event, format) in cases {
            match event {
                SampleEvent::Text(line) => assert_eq!(parse_text_event(&line).format, format, "{}", line),
                other => panic!("expected text event, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_same_seed_same_event() {
        let base = Utc::now();
        let a = okta_system_log(&mut StdRng::seed_from_u64(42), base);
        let b = okta_system_log(&mut StdRng::seed_from_u64(42), base);
        assert_eq!(a, b);
    }
}
