/// Built-in DNS providers: the 5 drivers named in spec.md §4.3's config table.
pub mod alibaba;
pub mod cloudflare;
pub mod godaddy;
pub mod route53;
pub mod tencent;

pub use alibaba::AlibabaCloudDnsProvider;
pub use cloudflare::CloudFlareDnsProvider;
pub use godaddy::GodaddyDnsProvider;
pub use route53::{Route53Config, Route53DnsProvider};
pub use tencent::TencentCloudDnsProvider;
