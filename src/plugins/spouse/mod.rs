pub mod data;
pub mod ledger;
pub mod process;
pub mod reset;
pub mod roster;
pub use process::on_message;

pub const HELP: &str = "帮助信息：
/今日老婆 (抽取, 抽老婆, wife) - 抽取今日老婆
/今日老婆-@ (抽取-@, 抽老婆-@, wife-@) - 抽取今日老婆(不@对方)
/今日记录 (记录, record) - 查看抽取记录
/老婆榜 (排行, rank) - 查看本群今日排行
/设置上限 N (setlimit N) - 设置本群每日抽取上限(仅管理员)
/帮助 (help) - 查看帮助";

pub const NO_HISTORY: &str = "你今日还未抽取老婆";
pub const EMPTY_LEADERBOARD: &str = "今日本群还没有人被抽到";
pub const NO_CANDIDATES: &str = "群里没有可以抽取的成员";
pub const FETCH_FAILED: &str = "获取群成员失败，请稍后再试";
pub const NO_GROUP: &str = "获取出错! 请在群聊中使用";
pub const NOT_ADMIN: &str = "只有管理员可以设置抽取上限";
pub const LIMIT_USAGE: &str = "用法: /设置上限 次数";
